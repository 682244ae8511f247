//! Scripted replays against an in-memory host.
//!
//! A script is a JSON document with a list of steps:
//!
//! ```json
//! {
//!   "steps": [
//!     { "step": "open", "id": 10, "url": "https://jobs.example.com/apply" },
//!     { "step": "start", "origin": 10, "purpose": "oauth" },
//!     { "step": "open", "id": 11, "opener": 10, "url": "https://accounts.google.com/o/oauth2/auth" },
//!     { "step": "navigate", "id": 11, "url": "https://jobs.example.com/cb?code=abc" }
//!   ]
//! }
//! ```
//!
//! Every emitted event is printed as it happens, followed by the responses of
//! detached commands and a final summary of all sessions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use serde::{Deserialize, Serialize};
use tabwright::{
	ChannelRequest, ChannelResponse, Context, ContextId, FlowEvent, MemoryHost, MessageSender, Orchestrator, OrchestratorConfig, Purpose, Session, StartOptions,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::CommandContext;
use crate::output::print_record;

const SETTLE: Duration = Duration::from_millis(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
	/// Replaces the command-line config for this replay.
	#[serde(default)]
	pub config: Option<OrchestratorConfig>,
	pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Step {
	/// Creates a context and notifies the router.
	Open {
		id: i32,
		url: String,
		#[serde(default)]
		opener: Option<i32>,
		#[serde(default = "default_window")]
		window: i32,
		#[serde(default)]
		title: String,
	},
	Navigate {
		id: i32,
		url: String,
	},
	Close {
		id: i32,
	},
	Activate {
		id: i32,
	},
	Start {
		origin: i32,
		#[serde(default)]
		purpose: Purpose,
		#[serde(default)]
		timeout_ms: Option<u64>,
		#[serde(default = "default_true")]
		auto_close: bool,
	},
	Complete {
		origin: i32,
		#[serde(default = "default_true")]
		auto_return: bool,
	},
	Fail {
		origin: i32,
		#[serde(default)]
		reason: String,
	},
	Cancel {
		origin: i32,
	},
	/// Sends a command-channel request from `sender`. Detached requests run in
	/// the background and report at the end of the replay.
	Command {
		sender: i32,
		request: ChannelRequest,
		#[serde(default)]
		detach: bool,
	},
	Sleep {
		ms: u64,
	},
}

fn default_window() -> i32 {
	1
}

fn default_true() -> bool {
	true
}

/// One line of replay output.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplayRecord {
	Event(FlowEvent),
	Report(Report),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Report {
	Response {
		step: usize,
		request: &'static str,
		sender: ContextId,
		response: ChannelResponse,
	},
	Summary {
		sessions: Vec<Session>,
	},
}

pub async fn execute(path: &Path, ctx: &CommandContext) -> anyhow::Result<()> {
	let content = std::fs::read_to_string(path).with_context(|| format!("failed to read script {}", path.display()))?;
	let script: Script = serde_json::from_str(&content).with_context(|| format!("invalid replay script {}", path.display()))?;
	let config = match script.config {
		Some(config) => {
			config.validate().context("invalid config in replay script")?;
			config
		}
		None => ctx.config.clone(),
	};

	info!(target = "tabwright", script = %path.display(), steps = script.steps.len(), "replay");
	let format = ctx.format;
	let mut failure = None;
	run(script.steps, config, |record| {
		if failure.is_none() {
			if let Err(err) = print_record(format, &record, || describe(&record)) {
				failure = Some(err);
			}
		}
	})
	.await?;

	match failure {
		Some(err) => Err(err),
		None => Ok(()),
	}
}

/// Runs `steps` against a fresh host and orchestrator, handing every output record to `emit`.
pub async fn run(steps: Vec<Step>, config: OrchestratorConfig, mut emit: impl FnMut(ReplayRecord)) -> anyhow::Result<()> {
	let host = Arc::new(MemoryHost::new());
	let orchestrator = Orchestrator::new(host.clone(), config);
	orchestrator.start_listening();
	let (_subscription, mut events) = orchestrator.events().subscribe_channel();
	let mut detached: Vec<(usize, &'static str, ContextId, JoinHandle<ChannelResponse>)> = Vec::new();

	for (index, step) in steps.into_iter().enumerate() {
		let number = index + 1;
		debug!(target = "tabwright", step = number, ?step, "replay step");
		match step {
			Step::Open { id, url, opener, window, title } => {
				let mut context = Context::new(id, window, url).with_title(title);
				if let Some(opener) = opener {
					context = context.with_opener(opener);
				}
				host.open(context);
			}
			Step::Navigate { id, url } => {
				if !host.navigate(id, url) {
					warn!(target = "tabwright", step = number, context = id, "navigate: no such context");
				}
			}
			Step::Close { id } => {
				if !host.close(id) {
					warn!(target = "tabwright", step = number, context = id, "close: no such context");
				}
			}
			Step::Activate { id } => {
				if !host.activate(id) {
					warn!(target = "tabwright", step = number, context = id, "activate: no such context");
				}
			}
			Step::Start {
				origin,
				purpose,
				timeout_ms,
				auto_close,
			} => {
				let mut options = StartOptions::default().auto_close(auto_close);
				if let Some(ms) = timeout_ms {
					options = options.timeout(Duration::from_millis(ms));
				}
				orchestrator
					.start_with(origin, purpose, options)
					.await
					.with_context(|| format!("step {number}: could not start a session on context {origin}"))?;
			}
			Step::Complete { origin, auto_return } => {
				let session = session_at(&orchestrator, number, origin)?;
				orchestrator.complete(&session.id, auto_return).await;
			}
			Step::Fail { origin, reason } => {
				let session = session_at(&orchestrator, number, origin)?;
				orchestrator.fail(&session.id, reason).await;
			}
			Step::Cancel { origin } => {
				let session = session_at(&orchestrator, number, origin)?;
				orchestrator.cancel(&session.id).await;
			}
			Step::Command { sender, request, detach } => {
				let kind = request.kind();
				let sender = ContextId(sender);
				if detach {
					let orchestrator = Arc::clone(&orchestrator);
					let task = tokio::spawn(async move { orchestrator.handle_command(&MessageSender::context(sender), request).await });
					detached.push((number, kind, sender, task));
				} else {
					let response = orchestrator.handle_command(&MessageSender::context(sender), request).await;
					drain(&mut events, &mut emit);
					emit(ReplayRecord::Report(Report::Response {
						step: number,
						request: kind,
						sender,
						response,
					}));
				}
			}
			Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
		}

		tokio::time::sleep(SETTLE).await;
		drain(&mut events, &mut emit);
	}

	for (step, request, sender, task) in detached {
		let response = task.await.with_context(|| format!("step {step}: {request} task failed"))?;
		drain(&mut events, &mut emit);
		emit(ReplayRecord::Report(Report::Response {
			step,
			request,
			sender,
			response,
		}));
	}

	tokio::time::sleep(SETTLE).await;
	drain(&mut events, &mut emit);
	orchestrator.stop_listening();
	emit(ReplayRecord::Report(Report::Summary {
		sessions: orchestrator.sessions(),
	}));
	Ok(())
}

fn session_at(orchestrator: &Orchestrator, step: usize, origin: i32) -> anyhow::Result<Session> {
	match orchestrator.session_for_context(origin) {
		Some(session) => Ok(session),
		None => bail!("step {step}: no session tracks context {origin}"),
	}
}

fn drain(events: &mut mpsc::UnboundedReceiver<FlowEvent>, emit: &mut impl FnMut(ReplayRecord)) {
	while let Ok(event) = events.try_recv() {
		emit(ReplayRecord::Event(event));
	}
}

/// Text rendering of a record.
pub fn describe(record: &ReplayRecord) -> String {
	match record {
		ReplayRecord::Event(event) => {
			let detail = match event {
				FlowEvent::SessionStarted { session } => format!("origin={} purpose={}", session.origin.id, session.purpose),
				FlowEvent::TabOpened { context, .. } | FlowEvent::TabNavigated { context, .. } => format!("context={} url={}", context.id, context.url),
				FlowEvent::OauthDetected { context_id, provider, .. } => format!("context={context_id} provider={provider}"),
				FlowEvent::AtsDetected { context_id, ats, .. } => format!("context={context_id} ats={ats}"),
				FlowEvent::TabClosed { context_id, .. } | FlowEvent::TabActivated { context_id, .. } => format!("context={context_id}"),
				FlowEvent::OauthSuccess { context_id, provider, .. } => {
					format!("context={context_id} provider={}", provider.as_deref().unwrap_or("-"))
				}
				FlowEvent::OauthFailure { context_id, url, .. } => format!("context={context_id} url={url}"),
				FlowEvent::SessionTimeout { .. } => String::new(),
				FlowEvent::SessionCompleted { session } | FlowEvent::SessionCancelled { session } => format!("children={}", session.children.len()),
				FlowEvent::SessionFailed { reason, .. } => format!("reason={reason:?}"),
			};
			format!("{:<18} {} {}", event.kind(), event.session_id(), detail).trim_end().to_string()
		}
		ReplayRecord::Report(Report::Response {
			step,
			request,
			sender,
			response,
		}) => {
			let body = serde_json::to_string(response).unwrap_or_else(|err| format!("<{err}>"));
			format!("{:<18} step={step} sender={sender} {request} -> {body}", "response")
		}
		ReplayRecord::Report(Report::Summary { sessions }) => {
			let mut text = format!("{} session(s)", sessions.len());
			for session in sessions {
				text.push_str(&format!(
					"\n  {} origin={} purpose={} state={} children={}",
					session.id,
					session.origin.id,
					session.purpose,
					session.state,
					session.children.len()
				));
				if let Some(reason) = &session.reason {
					text.push_str(&format!(" reason={reason:?}"));
				}
			}
			text
		}
	}
}

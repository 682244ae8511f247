//! Cross-context command channel: request handlers and an in-process transport.
//!
//! Content scripts address the orchestrator with [`ChannelRequest`]s tagged
//! with the [`MessageSender`] they came from. Handlers never return errors;
//! every failure is folded into the [`ChannelResponse`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tabwright_protocol::{ChannelRequest, ChannelResponse, ContextId, MessageSender, Purpose, Session, SessionId, SessionState};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classifier::{Provider, classify_provider, provider_by_name, purpose_hint};
use crate::error::{Error, Result};
use crate::orchestrator::Orchestrator;
use crate::waiter::ProviderOutcome;

const NO_SENDER: &str = "No sender tab";
const REQUEST_QUEUE: usize = 64;

impl Orchestrator {
	/// Handles one command from a content script.
	pub async fn handle_command(&self, sender: &MessageSender, request: ChannelRequest) -> ChannelResponse {
		debug!(target = "tabwright.channel", kind = request.kind(), context = ?sender.context_id, "command");
		match request {
			ChannelRequest::SessionStart { purpose } => {
				let Some(origin) = sender.context_id else {
					return ChannelResponse::error(NO_SENDER);
				};
				match self.ensure_session(origin, purpose).await {
					Ok(session_id) => ChannelResponse::Started { session_id },
					Err(err) => ChannelResponse::error(err.to_string()),
				}
			}
			ChannelRequest::SessionComplete { session_id } => {
				self.complete(&session_id, true).await;
				ChannelResponse::ok()
			}
			ChannelRequest::SessionFail { session_id, reason } => {
				self.fail(&session_id, reason).await;
				ChannelResponse::ok()
			}
			ChannelRequest::SessionCancel { session_id } => {
				self.cancel(&session_id).await;
				ChannelResponse::ok()
			}
			ChannelRequest::PendingOpen { reason } => {
				let Some(origin) = sender.context_id else {
					return ChannelResponse::error(NO_SENDER);
				};
				match self.ensure_session(origin, purpose_hint(&reason)).await {
					Ok(session_id) => {
						debug!(target = "tabwright.channel", session = %session_id, %reason, "pending open recorded");
						self.registry.lock().record_pending_open(origin, session_id, reason);
						ChannelResponse::ok()
					}
					Err(err) => ChannelResponse::error(err.to_string()),
				}
			}
			ChannelRequest::GetSession { session_id } => {
				let session = match session_id {
					Some(id) => self.session(&id),
					None => sender.context_id.and_then(|context| self.session_for_context(context)),
				};
				ChannelResponse::session(session)
			}
			ChannelRequest::HandleOauth { provider } => {
				let Some(origin) = sender.context_id else {
					return ChannelResponse::failure(NO_SENDER);
				};
				let provider = provider.as_deref().and_then(|name| {
					let found = provider_by_name(name);
					if found.is_none() {
						warn!(target = "tabwright.channel", provider = name, "unknown provider; using generic completion patterns");
					}
					found
				});
				match self.handle_oauth_flow(origin, provider).await {
					Ok(session) if session.state == SessionState::Completed => ChannelResponse::ok(),
					Ok(session) => ChannelResponse::failure(session.reason.unwrap_or_else(|| format!("Session {}", session.state))),
					Err(err) => ChannelResponse::failure(err.to_string()),
				}
			}
		}
	}

	/// Decodes a raw JSON command and encodes its response.
	pub async fn handle_json(&self, sender: &MessageSender, message: Value) -> Value {
		let response = match serde_json::from_value::<ChannelRequest>(message) {
			Ok(request) => self.handle_command(sender, request).await,
			Err(err) => ChannelResponse::error(format!("Invalid request: {err}")),
		};
		serde_json::to_value(&response).unwrap_or_else(|err| json!({ "error": err.to_string() }))
	}

	/// Runs a delegated OAuth wait for the session anchored at `origin`.
	///
	/// Resolves with the terminal session snapshot once the waiter chain or
	/// anything else (router, watchdog, another command) ends the session.
	pub async fn handle_oauth_flow(&self, origin: ContextId, provider: Option<&'static Provider>) -> Result<Session> {
		let session_id = self.ensure_session(origin, Purpose::Oauth).await?;
		{
			let mut registry = self.registry.lock();
			registry.set_purpose(&session_id, Purpose::Oauth);
			if let Some(provider) = provider {
				registry.set_provider(&session_id, provider.name);
			}
		}

		let (_subscription, mut events) = self.events().subscribe_channel();
		self.mark_waiting(&session_id);
		if let Some(session) = self.session(&session_id).filter(Session::is_terminal) {
			return Ok(session);
		}
		info!(target = "tabwright.channel", session = %session_id, provider = ?provider.map(|p| p.name), "waiting for oauth flow");

		let ended = async {
			while let Some(event) = events.recv().await {
				if event.session_id() == &session_id {
					if let Some(session) = event.terminal_session() {
						return Some(session.clone());
					}
				}
			}
			None
		};

		let drive = self.drive_oauth(&session_id, origin, provider);
		tokio::pin!(drive);
		let outcome = tokio::select! {
			ended = ended => match ended {
				Some(session) => return Ok(session),
				None => {
					debug!(target = "tabwright.channel", session = %session_id, "event stream closed; following the waiters alone");
					drive.await
				}
			},
			outcome = &mut drive => outcome,
		};
		if let Err(err) = outcome {
			self.fail(&session_id, err.to_string()).await;
		}

		self.session(&session_id).ok_or_else(|| Error::Host(format!("session {session_id} was evicted")))
	}

	async fn drive_oauth(&self, session_id: &SessionId, origin: ContextId, provider: Option<&'static Provider>) -> Result<()> {
		let waiters = self.waiters();
		let popup = waiters.wait_for_new_context(origin, self.config().new_context_timeout());
		let existing = self.session(session_id).and_then(|session| {
			session
				.children
				.iter()
				.rev()
				.find(|child| classify_provider(child.effective_url()).is_some_and(|found| provider.is_none_or(|wanted| wanted.name == found.name)))
				.map(|child| child.id)
		});
		let context = match existing {
			Some(context) => {
				popup.cancel();
				context
			}
			None => popup.await?.id,
		};

		let provider = provider.or_else(|| self.session(session_id).and_then(|session| session.provider).and_then(|name| provider_by_name(&name)));
		let timeout = provider.map_or(Duration::from_millis(self.config().oauth_timeout_ms), |provider| Duration::from_millis(provider.timeout_ms));

		match waiters.wait_for_provider_completion(context, provider, timeout).await? {
			ProviderOutcome::Denied { url } => {
				debug!(target = "tabwright.channel", session = %session_id, %url, "provider denied authorization");
				let name = provider.map_or("provider", |provider| provider.name);
				self.fail(session_id, format!("Authorization denied by {name}")).await;
			}
			ProviderOutcome::Authorized { .. } | ProviderOutcome::ClosedUnclassified => {
				self.complete(session_id, true).await;
			}
		}
		Ok(())
	}

	/// Id of the live session anchored at `origin`, starting one with `purpose` if none exists.
	async fn ensure_session(&self, origin: ContextId, purpose: Purpose) -> Result<SessionId> {
		if let Some(session) = self.session_anchored_at(origin) {
			return Ok(session.id);
		}
		Ok(self.start(origin, purpose).await?.id)
	}
}

struct Envelope {
	sender: MessageSender,
	request: ChannelRequest,
	reply: oneshot::Sender<ChannelResponse>,
}

/// Serves commands for one orchestrator on a background task.
pub struct ChannelServer;

impl ChannelServer {
	/// Spawns the server. It runs until every [`ChannelClient`] has been dropped.
	///
	/// Each request is handled on its own task, so a pending HANDLE_OAUTH does
	/// not hold up other requests.
	pub fn spawn(orchestrator: Arc<Orchestrator>) -> (ChannelClient, JoinHandle<()>) {
		let (tx, mut rx) = mpsc::channel::<Envelope>(REQUEST_QUEUE);
		let task = tokio::spawn(async move {
			while let Some(envelope) = rx.recv().await {
				let orchestrator = Arc::clone(&orchestrator);
				tokio::spawn(async move {
					let Envelope { sender, request, reply } = envelope;
					let kind = request.kind();
					let response = orchestrator.handle_command(&sender, request).await;
					if reply.send(response).is_err() {
						debug!(target = "tabwright.channel", kind, "requester dropped before the reply");
					}
				});
			}
			debug!(target = "tabwright.channel", "all clients gone; channel server stopped");
		});
		(ChannelClient { tx }, task)
	}
}

/// Cloneable handle for sending commands to a [`ChannelServer`].
#[derive(Debug, Clone)]
pub struct ChannelClient {
	tx: mpsc::Sender<Envelope>,
}

impl ChannelClient {
	pub async fn request(&self, sender: MessageSender, request: ChannelRequest) -> Result<ChannelResponse> {
		let (reply, response) = oneshot::channel();
		self.tx.send(Envelope { sender, request, reply }).await.map_err(|_| Error::ChannelClosed)?;
		response.await.map_err(|_| Error::ChannelClosed)
	}
}

impl std::fmt::Debug for Envelope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Envelope").field("sender", &self.sender).field("request", &self.request.kind()).finish()
	}
}

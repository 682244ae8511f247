//! Fans host notifications out to the sessions that own the affected contexts.
//!
//! Each handler locks the registry, applies its mutation, collects the events
//! to publish, and releases the lock before emitting or calling back into the
//! lifecycle methods. Notifications for contexts nobody owns are ignored.

use std::sync::Weak;

use tabwright_protocol::{ChangeInfo, Context, ContextId, HostNotification, Purpose, WindowId};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace, warn};

use crate::classifier::{Completion, classify_completion, classify_context, classify_provider, provider_by_name};
use crate::events::FlowEvent;
use crate::orchestrator::{ORIGIN_CLOSED, Orchestrator};

/// Drains `notifications` one at a time until the stream closes or the orchestrator is dropped.
pub(crate) async fn run(orchestrator: Weak<Orchestrator>, mut notifications: broadcast::Receiver<HostNotification>) {
	loop {
		match notifications.recv().await {
			Ok(notification) => {
				let Some(orchestrator) = orchestrator.upgrade() else {
					break;
				};
				orchestrator.handle_notification(notification).await;
			}
			Err(RecvError::Lagged(skipped)) => {
				warn!(target = "tabwright.router", skipped, "router lagged behind host notifications");
			}
			Err(RecvError::Closed) => {
				debug!(target = "tabwright.router", "host notification stream closed");
				break;
			}
		}
	}
}

enum Verdict {
	Authorized { provider: Option<String> },
	Denied { provider: Option<String>, url: String },
}

impl Orchestrator {
	/// Applies one host notification. The listening task calls this for every
	/// notification it receives; it can also be driven directly.
	pub async fn handle_notification(&self, notification: HostNotification) {
		trace!(target = "tabwright.router", ?notification, "notification");
		match notification {
			HostNotification::Created { context } => self.on_created(context),
			HostNotification::Updated { context_id, changes, context } => self.on_updated(context_id, changes, context).await,
			HostNotification::Removed { context_id } => self.on_removed(context_id).await,
			HostNotification::Activated { context_id, window_id } => self.on_activated(context_id, window_id),
		}
	}

	fn on_created(&self, context: Context) {
		let classification = classify_context(context.effective_url(), &context.title);

		let mut events = Vec::new();
		{
			let mut registry = self.registry.lock();
			let (opener, pending) = match context.opener_context_id {
				Some(opener) => (opener, registry.take_pending_open(opener)),
				None => {
					if registry.owner_of(context.id).is_some() {
						return;
					}
					// Hosts that drop the opener still attribute the context to a recent PENDING_OPEN in its window.
					let Some((origin, pending)) = registry.claim_pending_open(context.window_id, self.config().new_context_timeout_ms) else {
						return;
					};
					(origin, Some(pending))
				}
			};
			let Some(session_id) = registry.session_anchored_at(opener).map(|session| session.id.clone()) else {
				return;
			};
			if !registry.attach_child(&session_id, context.clone()) {
				debug!(target = "tabwright.router", session = %session_id, context = %context.id, "duplicate creation ignored");
				return;
			}
			if let Some(pending) = pending {
				debug!(target = "tabwright.router", session = %session_id, context = %context.id, reason = %pending.reason, "pending open fulfilled");
			}

			let current = registry.get(&session_id).map(|session| session.purpose).unwrap_or_default();
			let purpose = classification.upgrade(current);
			if registry.set_purpose(&session_id, purpose) {
				debug!(target = "tabwright.router", session = %session_id, from = %current, to = %purpose, "purpose upgraded");
			}
			if let Some(provider) = classification.provider {
				registry.set_provider(&session_id, provider.name);
			}
			if let Some(ats) = classification.ats {
				registry.set_ats(&session_id, ats.name);
			}

			events.push(FlowEvent::TabOpened {
				session_id: session_id.clone(),
				context: context.clone(),
			});
			if let Some(provider) = classification.provider {
				events.push(FlowEvent::OauthDetected {
					session_id: session_id.clone(),
					context_id: context.id,
					provider: provider.name.to_string(),
				});
			}
			if let Some(ats) = classification.ats {
				events.push(FlowEvent::AtsDetected {
					session_id,
					context_id: context.id,
					ats: ats.name.to_string(),
				});
			}
		}

		for event in &events {
			self.events().emit(event);
		}
	}

	async fn on_updated(&self, context_id: ContextId, changes: ChangeInfo, mut context: Context) {
		context.id = context_id;
		if let Some(url) = changes.url {
			context.url = url;
		}

		let mut events = Vec::new();
		let mut verdict = None;
		let session_id = {
			let mut registry = self.registry.lock();
			let Some(session_id) = registry.refresh_context(&context) else {
				return;
			};
			let Some(session) = registry.get(&session_id) else {
				return;
			};
			let live = !session.is_terminal();
			let is_child = !session.is_origin(context_id);
			let known_provider = session.provider.clone();

			if live && is_child && known_provider.is_none() {
				if let Some(provider) = classify_provider(context.effective_url()) {
					registry.set_purpose(&session_id, Purpose::Oauth);
					registry.set_provider(&session_id, provider.name);
					events.push(FlowEvent::OauthDetected {
						session_id: session_id.clone(),
						context_id,
						provider: provider.name.to_string(),
					});
				}
			}

			events.push(FlowEvent::TabNavigated {
				session_id: session_id.clone(),
				context: context.clone(),
			});

			let purpose = registry.get(&session_id).map(|session| session.purpose);
			if live && is_child && purpose == Some(Purpose::Oauth) {
				let name = registry.get(&session_id).and_then(|session| session.provider.clone());
				let provider = name.as_deref().and_then(provider_by_name);
				verdict = match classify_completion(context.effective_url(), provider) {
					Completion::Success => Some(Verdict::Authorized { provider: name }),
					Completion::Failure => Some(Verdict::Denied {
						provider: name,
						url: context.effective_url().to_string(),
					}),
					Completion::Pending => None,
				};
			}
			session_id
		};

		for event in &events {
			self.events().emit(event);
		}

		match verdict {
			Some(Verdict::Authorized { provider }) => {
				debug!(target = "tabwright.router", session = %session_id, context = %context_id, "authorization completed");
				self.events().emit(&FlowEvent::OauthSuccess {
					session_id: session_id.clone(),
					context_id,
					provider,
				});
				self.complete(&session_id, true).await;
			}
			Some(Verdict::Denied { provider, url }) => {
				let reason = format!("Authorization denied by {}", provider.as_deref().unwrap_or("provider"));
				self.events().emit(&FlowEvent::OauthFailure {
					session_id: session_id.clone(),
					context_id,
					provider,
					url,
				});
				self.fail(&session_id, reason).await;
			}
			None => {}
		}
	}

	async fn on_removed(&self, context_id: ContextId) {
		let (session_id, live, was_origin, implicit_success) = {
			let mut registry = self.registry.lock();
			let Some(session_id) = registry.owner_of(context_id).cloned() else {
				return;
			};
			let Some(session) = registry.get(&session_id) else {
				return;
			};
			let live = !session.is_terminal();
			let was_origin = session.is_origin(context_id);
			let purpose = session.purpose;

			let mut implicit_success = false;
			if !was_origin {
				registry.detach_child(&session_id, context_id);
				let remaining = registry.get(&session_id).map_or(0, |session| session.children.len());
				implicit_success = live && purpose == Purpose::Oauth && remaining == 0;
			}
			(session_id, live, was_origin, implicit_success)
		};

		self.events().emit(&FlowEvent::TabClosed {
			session_id: session_id.clone(),
			context_id,
		});

		if was_origin && live {
			self.fail(&session_id, ORIGIN_CLOSED).await;
		} else if implicit_success {
			warn!(
				target = "tabwright.router",
				session = %session_id,
				context = %context_id,
				"last oauth context closed without a redirect signal; treating as success"
			);
			self.complete(&session_id, true).await;
		}
	}

	fn on_activated(&self, context_id: ContextId, window_id: WindowId) {
		let focused = self.registry.lock().set_focus(context_id);
		let Some(session_id) = focused else {
			return;
		};
		trace!(target = "tabwright.router", session = %session_id, context = %context_id, window = %window_id, "focus changed");
		self.events().emit(&FlowEvent::TabActivated { session_id, context_id });
	}
}

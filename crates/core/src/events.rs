//! Lifecycle events and the publish/subscribe registry that delivers them.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tabwright_protocol::{Context, ContextId, Session, SessionId};
use tokio::sync::mpsc;

/// Closed set of events emitted by the orchestrator.
///
/// Serializes as `{"type": "session-started", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FlowEvent {
	SessionStarted {
		session: Session,
	},
	TabOpened {
		session_id: SessionId,
		context: Context,
	},
	OauthDetected {
		session_id: SessionId,
		context_id: ContextId,
		provider: String,
	},
	AtsDetected {
		session_id: SessionId,
		context_id: ContextId,
		ats: String,
	},
	TabNavigated {
		session_id: SessionId,
		context: Context,
	},
	TabClosed {
		session_id: SessionId,
		context_id: ContextId,
	},
	TabActivated {
		session_id: SessionId,
		context_id: ContextId,
	},
	OauthSuccess {
		session_id: SessionId,
		context_id: ContextId,
		#[serde(skip_serializing_if = "Option::is_none")]
		provider: Option<String>,
	},
	OauthFailure {
		session_id: SessionId,
		context_id: ContextId,
		#[serde(skip_serializing_if = "Option::is_none")]
		provider: Option<String>,
		url: String,
	},
	SessionTimeout {
		session_id: SessionId,
	},
	SessionCompleted {
		session: Session,
	},
	SessionFailed {
		session: Session,
		reason: String,
	},
	SessionCancelled {
		session: Session,
	},
}

impl FlowEvent {
	pub fn session_id(&self) -> &SessionId {
		match self {
			FlowEvent::SessionStarted { session }
			| FlowEvent::SessionCompleted { session }
			| FlowEvent::SessionFailed { session, .. }
			| FlowEvent::SessionCancelled { session } => &session.id,
			FlowEvent::TabOpened { session_id, .. }
			| FlowEvent::OauthDetected { session_id, .. }
			| FlowEvent::AtsDetected { session_id, .. }
			| FlowEvent::TabNavigated { session_id, .. }
			| FlowEvent::TabClosed { session_id, .. }
			| FlowEvent::TabActivated { session_id, .. }
			| FlowEvent::OauthSuccess { session_id, .. }
			| FlowEvent::OauthFailure { session_id, .. }
			| FlowEvent::SessionTimeout { session_id } => session_id,
		}
	}

	/// Wire name of the event, e.g. `"oauth-detected"`.
	pub fn kind(&self) -> &'static str {
		match self {
			FlowEvent::SessionStarted { .. } => "session-started",
			FlowEvent::TabOpened { .. } => "tab-opened",
			FlowEvent::OauthDetected { .. } => "oauth-detected",
			FlowEvent::AtsDetected { .. } => "ats-detected",
			FlowEvent::TabNavigated { .. } => "tab-navigated",
			FlowEvent::TabClosed { .. } => "tab-closed",
			FlowEvent::TabActivated { .. } => "tab-activated",
			FlowEvent::OauthSuccess { .. } => "oauth-success",
			FlowEvent::OauthFailure { .. } => "oauth-failure",
			FlowEvent::SessionTimeout { .. } => "session-timeout",
			FlowEvent::SessionCompleted { .. } => "session-completed",
			FlowEvent::SessionFailed { .. } => "session-failed",
			FlowEvent::SessionCancelled { .. } => "session-cancelled",
		}
	}

	/// Terminal session snapshot carried by completed/failed/cancelled events.
	pub fn terminal_session(&self) -> Option<&Session> {
		match self {
			FlowEvent::SessionCompleted { session } | FlowEvent::SessionFailed { session, .. } | FlowEvent::SessionCancelled { session } => Some(session),
			_ => None,
		}
	}
}

type Listener = Arc<dyn Fn(&FlowEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
	next_id: u64,
	entries: Vec<(u64, Listener)>,
}

/// Publish/subscribe registry for [`FlowEvent`]s.
///
/// Listeners run synchronously on the emitting task, in subscription order,
/// and never while the registry lock is held, so a listener may subscribe,
/// unsubscribe, or read orchestrator state.
#[derive(Clone, Default)]
pub struct EventBus {
	inner: Arc<Mutex<Listeners>>,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: Fn(&FlowEvent) + Send + Sync + 'static,
	{
		let mut inner = self.inner.lock();
		let id = inner.next_id;
		inner.next_id += 1;
		inner.entries.push((id, Arc::new(listener)));
		Subscription {
			id,
			bus: Arc::downgrade(&self.inner),
			active: true,
		}
	}

	/// Subscribes a channel; events arrive on the returned receiver until the subscription is dropped.
	pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<FlowEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let subscription = self.subscribe(move |event| {
			let _ = tx.send(event.clone());
		});
		(subscription, rx)
	}

	pub fn emit(&self, event: &FlowEvent) {
		let listeners: Vec<Listener> = self.inner.lock().entries.iter().map(|(_, listener)| Arc::clone(listener)).collect();
		for listener in listeners {
			listener(event);
		}
	}

	pub fn listener_count(&self) -> usize {
		self.inner.lock().entries.len()
	}
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus").field("listeners", &self.listener_count()).finish()
	}
}

/// Handle to a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
	id: u64,
	bus: Weak<Mutex<Listeners>>,
	active: bool,
}

impl Subscription {
	pub fn unsubscribe(self) {}

	/// Keeps the listener registered for the lifetime of the bus.
	pub fn detach(mut self) {
		self.active = false;
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if !self.active {
			return;
		}
		if let Some(bus) = self.bus.upgrade() {
			bus.lock().entries.retain(|(id, _)| *id != self.id);
		}
	}
}

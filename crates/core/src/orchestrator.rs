//! Session lifecycle: start, complete, fail, cancel.
//!
//! An [`Orchestrator`] owns the context registry, the event bus and the
//! watchdogs for one host. It is always handled through an `Arc`; background
//! tasks (router, watchdogs, eviction timers) hold only weak references, so
//! dropping the last `Arc` stops everything.
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(host.clone(), OrchestratorConfig::default());
//! orchestrator.start_listening();
//! let session = orchestrator.start(10, Purpose::Oauth).await?;
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tabwright_protocol::{Context, ContextId, Purpose, Session, SessionId, SessionState, now_ms};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, FlowEvent, Subscription};
use crate::host::Host;
use crate::registry::ContextRegistry;
use crate::router;
use crate::waiter::Waiters;
use crate::watchdog::TimeoutMonitor;

/// Failure reason recorded when a session's origin context disappears.
pub const ORIGIN_CLOSED: &str = "Origin tab was closed";
/// Failure reason recorded by the watchdog.
pub const SESSION_TIMED_OUT: &str = "Session timed out";

/// Per-session overrides for [`Orchestrator::start_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
	/// Session window; `None` uses the purpose default from the config.
	pub timeout: Option<Duration>,
	/// Close child contexts when the session completes or fails.
	pub auto_close: bool,
}

impl Default for StartOptions {
	fn default() -> Self {
		Self {
			timeout: None,
			auto_close: true,
		}
	}
}

impl StartOptions {
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn auto_close(mut self, auto_close: bool) -> Self {
		self.auto_close = auto_close;
		self
	}
}

pub struct Orchestrator {
	host: Arc<dyn Host>,
	config: OrchestratorConfig,
	pub(crate) registry: Mutex<ContextRegistry>,
	events: EventBus,
	watchdog: TimeoutMonitor,
	listener: Mutex<Option<JoinHandle<()>>>,
	weak: Weak<Orchestrator>,
}

impl Orchestrator {
	pub fn new(host: Arc<dyn Host>, config: OrchestratorConfig) -> Arc<Self> {
		Arc::new_cyclic(|weak| Self {
			host,
			watchdog: TimeoutMonitor::new(config.watchdog_tick()),
			config,
			registry: Mutex::new(ContextRegistry::new()),
			events: EventBus::new(),
			listener: Mutex::new(None),
			weak: weak.clone(),
		})
	}

	pub fn host(&self) -> &Arc<dyn Host> {
		&self.host
	}

	pub fn config(&self) -> &OrchestratorConfig {
		&self.config
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	/// Registers an event listener. Dropping the returned handle unsubscribes.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: Fn(&FlowEvent) + Send + Sync + 'static,
	{
		self.events.subscribe(listener)
	}

	/// Waiter factory bound to this orchestrator's host and poll interval.
	pub fn waiters(&self) -> Waiters {
		Waiters::new(Arc::clone(&self.host), self.config.poll_interval())
	}

	/// Starts a session with the purpose's default window and `auto_close` on.
	pub async fn start(&self, origin: impl Into<ContextId>, purpose: Purpose) -> Result<Session> {
		self.start_with(origin, purpose, StartOptions::default()).await
	}

	/// Starts a session anchored at `origin`.
	///
	/// Fails with [`Error::NotFound`] if the host cannot resolve the origin and
	/// with [`Error::ContextOwned`] if it already belongs to a live session.
	pub async fn start_with(&self, origin: impl Into<ContextId>, purpose: Purpose, options: StartOptions) -> Result<Session> {
		let origin = origin.into();
		let context = self.host.get_context(origin).await?.ok_or(Error::NotFound(origin))?;
		let timeout = options.timeout.unwrap_or_else(|| self.config.timeout_for(purpose));

		let session = {
			let mut registry = self.registry.lock();
			let id = registry.next_session_id();
			let session = Session {
				id,
				origin: context,
				children: Vec::new(),
				purpose,
				state: SessionState::Active,
				provider: None,
				ats: None,
				started_at: now_ms(),
				completed_at: None,
				timeout_ms: timeout.as_millis() as u64,
				auto_close: options.auto_close,
				reason: None,
				focused_context_id: None,
			};
			registry.insert(session.clone())?;
			session
		};

		self.arm_watchdog(&session.id, timeout);
		info!(
			target = "tabwright.session",
			session = %session.id,
			%origin,
			%purpose,
			timeout_ms = session.timeout_ms,
			"session started"
		);
		self.events.emit(&FlowEvent::SessionStarted { session: session.clone() });
		Ok(session)
	}

	/// Completes a live session. Returns `false` if it was unknown or already terminal.
	///
	/// Children are closed when the session has `auto_close`; `auto_return`
	/// refocuses the origin context and its window.
	pub async fn complete(&self, id: &SessionId, auto_return: bool) -> bool {
		let finished = self.registry.lock().finish(id, SessionState::Completed, None);
		let Some(session) = finished else {
			debug!(target = "tabwright.session", session = %id, "complete ignored; session not live");
			return false;
		};

		self.watchdog.disarm(id);
		if session.auto_close {
			self.close_children(&session).await;
		}
		if auto_return {
			self.refocus(&session.origin).await;
		}

		info!(target = "tabwright.session", session = %id, children = session.children.len(), "session completed");
		self.events.emit(&FlowEvent::SessionCompleted { session });
		self.schedule_eviction(id.clone());
		true
	}

	/// Fails a live session with `reason`. Returns `false` if it was unknown or already terminal.
	pub async fn fail(&self, id: &SessionId, reason: impl Into<String>) -> bool {
		let reason = reason.into();
		let finished = self.registry.lock().finish(id, SessionState::Failed, Some(reason.clone()));
		let Some(session) = finished else {
			debug!(target = "tabwright.session", session = %id, %reason, "fail ignored; session not live");
			return false;
		};

		self.watchdog.disarm(id);
		if session.auto_close {
			self.close_children(&session).await;
		}

		warn!(target = "tabwright.session", session = %id, %reason, "session failed");
		self.events.emit(&FlowEvent::SessionFailed { session, reason });
		self.schedule_eviction(id.clone());
		true
	}

	/// Aborts a live session, closing its children regardless of `auto_close`.
	pub async fn cancel(&self, id: &SessionId) -> bool {
		let finished = self.registry.lock().finish(id, SessionState::Cancelled, None);
		let Some(session) = finished else {
			debug!(target = "tabwright.session", session = %id, "cancel ignored; session not live");
			return false;
		};

		self.watchdog.disarm(id);
		self.close_children(&session).await;

		info!(target = "tabwright.session", session = %id, "session cancelled");
		self.events.emit(&FlowEvent::SessionCancelled { session });
		self.schedule_eviction(id.clone());
		true
	}

	/// Moves an active session to `waiting`.
	pub fn mark_waiting(&self, id: &SessionId) -> bool {
		self.registry.lock().mark_waiting(id)
	}

	pub fn session(&self, id: &SessionId) -> Option<Session> {
		self.registry.lock().get(id).cloned()
	}

	/// Session owning `context`, as origin or child, including terminal ones not yet evicted.
	pub fn session_for_context(&self, context: impl Into<ContextId>) -> Option<Session> {
		self.registry.lock().session_for_context(context.into()).cloned()
	}

	/// Live session whose origin is `context`.
	pub fn session_anchored_at(&self, context: impl Into<ContextId>) -> Option<Session> {
		self.registry.lock().session_anchored_at(context.into()).cloned()
	}

	pub fn sessions(&self) -> Vec<Session> {
		let mut sessions: Vec<Session> = self.registry.lock().sessions().cloned().collect();
		sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.as_str().cmp(b.id.as_str())));
		sessions
	}

	pub fn is_watchdog_armed(&self, id: &SessionId) -> bool {
		self.watchdog.is_armed(id)
	}

	pub fn armed_watchdogs(&self) -> usize {
		self.watchdog.armed_count()
	}

	/// Subscribes the router to host notifications. Returns `false` if already listening.
	pub fn start_listening(&self) -> bool {
		let mut listener = self.listener.lock();
		if listener.as_ref().is_some_and(|task| !task.is_finished()) {
			return false;
		}
		let notifications = self.host.notifications();
		*listener = Some(tokio::spawn(router::run(self.weak.clone(), notifications)));
		debug!(target = "tabwright.router", "listening for host notifications");
		true
	}

	/// Drops the router's subscription. Returns `false` if it was not listening.
	pub fn stop_listening(&self) -> bool {
		match self.listener.lock().take() {
			Some(task) => {
				task.abort();
				debug!(target = "tabwright.router", "stopped listening");
				true
			}
			None => false,
		}
	}

	pub fn is_listening(&self) -> bool {
		self.listener.lock().as_ref().is_some_and(|task| !task.is_finished())
	}

	fn arm_watchdog(&self, id: &SessionId, timeout: Duration) {
		let weak = self.weak.clone();
		let session_id = id.clone();
		self.watchdog.arm(id.clone(), timeout, move || async move {
			if let Some(orchestrator) = weak.upgrade() {
				orchestrator.expire(&session_id).await;
			}
		});
	}

	async fn expire(&self, id: &SessionId) {
		let live = self.registry.lock().get(id).is_some_and(|session| !session.is_terminal());
		if !live {
			return;
		}
		warn!(target = "tabwright.watchdog", session = %id, "session exceeded its window");
		self.events.emit(&FlowEvent::SessionTimeout { session_id: id.clone() });
		self.fail(id, SESSION_TIMED_OUT).await;
	}

	async fn close_children(&self, session: &Session) {
		for child in &session.children {
			if let Err(err) = self.host.close_context(child.id).await {
				debug!(target = "tabwright.session", session = %session.id, context = %child.id, error = %err, "child already gone");
			}
		}
	}

	async fn refocus(&self, origin: &Context) {
		if let Err(err) = self.host.set_active(origin.id).await {
			warn!(target = "tabwright.session", context = %origin.id, error = %err, "could not reactivate origin");
		}
		if let Err(err) = self.host.focus_window(origin.window_id).await {
			warn!(target = "tabwright.session", window = %origin.window_id, error = %err, "could not focus origin window");
		}
	}

	fn schedule_eviction(&self, id: SessionId) {
		let weak = self.weak.clone();
		let grace = self.config.eviction_grace();
		tokio::spawn(async move {
			tokio::time::sleep(grace).await;
			let Some(orchestrator) = weak.upgrade() else {
				return;
			};
			let evicted = orchestrator.registry.lock().evict(&id);
			if evicted.is_some() {
				debug!(target = "tabwright.session", session = %id, "session evicted");
			}
		});
	}
}

impl Drop for Orchestrator {
	fn drop(&mut self) {
		if let Some(task) = self.listener.get_mut().take() {
			task.abort();
		}
	}
}

impl std::fmt::Debug for Orchestrator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Orchestrator")
			.field("config", &self.config)
			.field("sessions", &self.registry.lock().len())
			.field("armed_watchdogs", &self.watchdog.armed_count())
			.field("listening", &self.is_listening())
			.finish()
	}
}

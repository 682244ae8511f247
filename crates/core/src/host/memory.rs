//! In-memory host for tests and scripted replays.
//!
//! The controller methods (`open`, `navigate`, `close`, ...) mutate the tab
//! table and broadcast the matching notification, the way a browser would.
//! Calls made by the orchestrator are recorded for inspection.
//!
//! # Example
//!
//! ```ignore
//! let host = Arc::new(MemoryHost::new());
//! host.insert(Context::new(10, 1, "https://jobs.example.com/apply"));
//! let orchestrator = Orchestrator::new(host.clone(), OrchestratorConfig::default());
//! orchestrator.start_listening();
//!
//! host.open(Context::new(11, 1, "https://accounts.google.com/o/oauth2/auth").with_opener(10));
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tabwright_protocol::{ChangeInfo, Context, ContextId, HostNotification, LoadStatus, WindowId, now_ms};
use tokio::sync::broadcast;

use super::Host;
use crate::error::{Error, Result};

const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct MemoryState {
	contexts: BTreeMap<ContextId, Context>,
	close_requests: Vec<ContextId>,
	activations: Vec<ContextId>,
	focused_windows: Vec<WindowId>,
}

/// Tab table kept in memory, broadcasting notifications on every change.
#[derive(Debug)]
pub struct MemoryHost {
	state: Mutex<MemoryState>,
	notify_tx: broadcast::Sender<HostNotification>,
}

impl Default for MemoryHost {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryHost {
	pub fn new() -> Self {
		let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
		Self {
			state: Mutex::new(MemoryState::default()),
			notify_tx,
		}
	}

	/// Adds a context without notifying, e.g. a tab that existed before listening started.
	pub fn insert(&self, context: Context) {
		self.state.lock().contexts.insert(context.id, context);
	}

	/// Adds a context and broadcasts `created`.
	pub fn open(&self, mut context: Context) {
		context.observed_at = now_ms();
		self.state.lock().contexts.insert(context.id, context.clone());
		self.emit(HostNotification::Created { context });
	}

	/// Commits a navigation and broadcasts `updated`. Returns `false` for unknown contexts.
	pub fn navigate(&self, id: impl Into<ContextId>, url: impl Into<String>) -> bool {
		let id = id.into();
		let url = url.into();
		let updated = {
			let mut state = self.state.lock();
			let Some(context) = state.contexts.get_mut(&id) else {
				return false;
			};
			context.url = url.clone();
			context.pending_url = None;
			context.load_status = LoadStatus::Complete;
			context.observed_at = now_ms();
			context.clone()
		};
		self.emit(HostNotification::Updated {
			context_id: id,
			changes: ChangeInfo {
				url: Some(url),
				status: Some(LoadStatus::Complete),
				..Default::default()
			},
			context: updated,
		});
		true
	}

	pub fn set_title(&self, id: impl Into<ContextId>, title: impl Into<String>) -> bool {
		let id = id.into();
		let title = title.into();
		let updated = {
			let mut state = self.state.lock();
			let Some(context) = state.contexts.get_mut(&id) else {
				return false;
			};
			context.title = title.clone();
			context.clone()
		};
		self.emit(HostNotification::Updated {
			context_id: id,
			changes: ChangeInfo {
				title: Some(title),
				..Default::default()
			},
			context: updated,
		});
		true
	}

	/// Removes a context and broadcasts `removed`. Returns `false` if it was already gone.
	pub fn close(&self, id: impl Into<ContextId>) -> bool {
		let id = id.into();
		if self.state.lock().contexts.remove(&id).is_none() {
			return false;
		}
		self.emit(HostNotification::Removed { context_id: id });
		true
	}

	/// Marks a context as the active tab of its window and broadcasts `activated`.
	pub fn activate(&self, id: impl Into<ContextId>) -> bool {
		let id = id.into();
		let window_id = {
			let mut state = self.state.lock();
			let Some(window_id) = state.contexts.get(&id).map(|context| context.window_id) else {
				return false;
			};
			for context in state.contexts.values_mut().filter(|context| context.window_id == window_id) {
				context.active = context.id == id;
			}
			window_id
		};
		self.emit(HostNotification::Activated { context_id: id, window_id });
		true
	}

	/// Broadcasts a raw notification without touching the tab table.
	pub fn emit(&self, notification: HostNotification) {
		let _ = self.notify_tx.send(notification);
	}

	pub fn context(&self, id: impl Into<ContextId>) -> Option<Context> {
		self.state.lock().contexts.get(&id.into()).cloned()
	}

	pub fn contexts(&self) -> Vec<Context> {
		self.state.lock().contexts.values().cloned().collect()
	}

	/// Every `close_context` call, including ones for contexts that were already gone.
	pub fn close_requests(&self) -> Vec<ContextId> {
		self.state.lock().close_requests.clone()
	}

	pub fn activations(&self) -> Vec<ContextId> {
		self.state.lock().activations.clone()
	}

	pub fn focused_windows(&self) -> Vec<WindowId> {
		self.state.lock().focused_windows.clone()
	}

	/// Number of live notification receivers.
	pub fn subscriber_count(&self) -> usize {
		self.notify_tx.receiver_count()
	}
}

#[async_trait]
impl Host for MemoryHost {
	async fn get_context(&self, id: ContextId) -> Result<Option<Context>> {
		Ok(self.context(id))
	}

	async fn set_active(&self, id: ContextId) -> Result<()> {
		self.state.lock().activations.push(id);
		if self.activate(id) { Ok(()) } else { Err(Error::Host(format!("No tab with id: {id}"))) }
	}

	async fn focus_window(&self, id: WindowId) -> Result<()> {
		self.state.lock().focused_windows.push(id);
		Ok(())
	}

	async fn close_context(&self, id: ContextId) -> Result<()> {
		self.state.lock().close_requests.push(id);
		if self.close(id) { Ok(()) } else { Err(Error::Host(format!("No tab with id: {id}"))) }
	}

	fn notifications(&self) -> broadcast::Receiver<HostNotification> {
		self.notify_tx.subscribe()
	}
}

//! Per-session watchdogs checked on a fixed tick.
//!
//! Each armed session gets one task that wakes every `tick` and compares the
//! clock with its deadline, so expiry is detected up to one tick late.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tabwright_protocol::SessionId;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug)]
pub struct TimeoutMonitor {
	tick: Duration,
	armed: Arc<Mutex<HashMap<SessionId, JoinHandle<()>>>>,
}

impl TimeoutMonitor {
	pub fn new(tick: Duration) -> Self {
		Self {
			tick,
			armed: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	pub fn tick(&self) -> Duration {
		self.tick
	}

	/// Arms the watchdog for `session_id`, replacing any previous one.
	///
	/// `on_expire` runs once, after the watchdog has removed itself from the
	/// armed set, so it may call [`TimeoutMonitor::disarm`] freely.
	pub fn arm<F, Fut>(&self, session_id: SessionId, timeout: Duration, on_expire: F)
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let deadline = Instant::now() + timeout;
		let tick = self.tick;
		let armed = Arc::clone(&self.armed);
		let id = session_id.clone();

		// Held across the spawn so the task cannot look itself up before it is registered.
		let mut slots = self.armed.lock();
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(tick);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;
			loop {
				ticker.tick().await;
				if Instant::now() >= deadline {
					break;
				}
			}

			if armed.lock().remove(&id).is_none() {
				return;
			}
			debug!(target = "tabwright.watchdog", session = %id, "deadline passed");
			on_expire().await;
		});

		if let Some(previous) = slots.insert(session_id, handle) {
			previous.abort();
		}
	}

	/// Stops the watchdog of `session_id`. Returns `false` if none was armed.
	pub fn disarm(&self, session_id: &SessionId) -> bool {
		match self.armed.lock().remove(session_id) {
			Some(handle) => {
				handle.abort();
				true
			}
			None => false,
		}
	}

	pub fn is_armed(&self, session_id: &SessionId) -> bool {
		self.armed.lock().contains_key(session_id)
	}

	pub fn armed_count(&self) -> usize {
		self.armed.lock().len()
	}

	pub fn disarm_all(&self) {
		for (_, handle) in self.armed.lock().drain() {
			handle.abort();
		}
	}
}

impl Drop for TimeoutMonitor {
	fn drop(&mut self) {
		self.disarm_all();
	}
}

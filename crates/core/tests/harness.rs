// Shared setup for orchestrator integration tests.
//
// Each test builds its own MemoryHost + Orchestrator pair with the router
// listening, and records every emitted event for later assertions.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tabwright::{Context, FlowEvent, MemoryHost, Orchestrator, OrchestratorConfig, Subscription};

pub struct Harness {
	pub host: Arc<MemoryHost>,
	pub orchestrator: Arc<Orchestrator>,
	recorded: Arc<Mutex<Vec<FlowEvent>>>,
	_recorder: Subscription,
}

impl Harness {
	pub fn new() -> Self {
		Self::with_config(OrchestratorConfig::default())
	}

	pub fn with_config(config: OrchestratorConfig) -> Self {
		let host = Arc::new(MemoryHost::new());
		let orchestrator = Orchestrator::new(host.clone(), config);
		assert!(orchestrator.start_listening());

		let recorded = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&recorded);
		let recorder = orchestrator.subscribe(move |event| sink.lock().push(event.clone()));

		Self {
			host,
			orchestrator,
			recorded,
			_recorder: recorder,
		}
	}

	/// Adds a pre-existing tab (no notification) to anchor sessions on.
	pub fn with_origin(self, id: i32, url: &str) -> Self {
		self.host.insert(Context::new(id, 1, url));
		self
	}

	pub fn events(&self) -> Vec<FlowEvent> {
		self.recorded.lock().clone()
	}

	pub fn kinds(&self) -> Vec<&'static str> {
		self.recorded.lock().iter().map(FlowEvent::kind).collect()
	}

	pub fn count(&self, kind: &str) -> usize {
		self.recorded.lock().iter().filter(|event| event.kind() == kind).count()
	}
}

/// Lets the router and any spawned tasks drain pending notifications.
pub async fn settle() {
	tokio::time::sleep(Duration::from_millis(10)).await;
}

//! Orchestrator timing configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config file:
//!
//! ```json
//! { "oauthTimeoutMs": 90000, "watchdogTickMs": 500 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabwright_protocol::Purpose;

use crate::error::{Error, Result};

pub const DEFAULT_OAUTH_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_WATCHDOG_TICK_MS: u64 = 1_000;
pub const DEFAULT_EVICTION_GRACE_MS: u64 = 5_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_NEW_CONTEXT_TIMEOUT_MS: u64 = 30_000;

const ENV_PREFIX: &str = "TABWRIGHT_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
	/// Session window for `oauth` sessions.
	pub oauth_timeout_ms: u64,
	/// Session window for every other purpose.
	pub default_timeout_ms: u64,
	pub watchdog_tick_ms: u64,
	/// How long a terminal session stays in the registry for late events.
	pub eviction_grace_ms: u64,
	pub poll_interval_ms: u64,
	/// Deadline for a popup to appear after HANDLE_OAUTH.
	pub new_context_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			oauth_timeout_ms: DEFAULT_OAUTH_TIMEOUT_MS,
			default_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
			watchdog_tick_ms: DEFAULT_WATCHDOG_TICK_MS,
			eviction_grace_ms: DEFAULT_EVICTION_GRACE_MS,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			new_context_timeout_ms: DEFAULT_NEW_CONTEXT_TIMEOUT_MS,
		}
	}
}

impl OrchestratorConfig {
	/// Loads and validates a JSON config file.
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	/// Applies `TABWRIGHT_*` overrides (e.g. `TABWRIGHT_WATCHDOG_TICK_MS=250`).
	pub fn with_env_overrides(self) -> Result<Self> {
		self.with_overrides(std::env::vars())
	}

	fn with_overrides(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
		for (key, value) in vars {
			let Some(name) = key.strip_prefix(ENV_PREFIX) else {
				continue;
			};
			let slot = match name {
				"OAUTH_TIMEOUT_MS" => &mut self.oauth_timeout_ms,
				"DEFAULT_TIMEOUT_MS" => &mut self.default_timeout_ms,
				"WATCHDOG_TICK_MS" => &mut self.watchdog_tick_ms,
				"EVICTION_GRACE_MS" => &mut self.eviction_grace_ms,
				"POLL_INTERVAL_MS" => &mut self.poll_interval_ms,
				"NEW_CONTEXT_TIMEOUT_MS" => &mut self.new_context_timeout_ms,
				_ => continue,
			};
			*slot = value
				.trim()
				.parse()
				.map_err(|_| Error::Config(format!("{key} must be a number of milliseconds, got '{value}'")))?;
		}
		self.validate()?;
		Ok(self)
	}

	pub fn validate(&self) -> Result<()> {
		if self.watchdog_tick_ms == 0 {
			return Err(Error::Config("watchdogTickMs must be greater than zero".to_string()));
		}
		if self.poll_interval_ms == 0 {
			return Err(Error::Config("pollIntervalMs must be greater than zero".to_string()));
		}
		Ok(())
	}

	/// Default session window for a purpose; OAuth gets the shorter one.
	pub fn timeout_for(&self, purpose: Purpose) -> Duration {
		match purpose {
			Purpose::Oauth => Duration::from_millis(self.oauth_timeout_ms),
			_ => Duration::from_millis(self.default_timeout_ms),
		}
	}

	pub fn watchdog_tick(&self) -> Duration {
		Duration::from_millis(self.watchdog_tick_ms)
	}

	pub fn eviction_grace(&self) -> Duration {
		Duration::from_millis(self.eviction_grace_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn new_context_timeout(&self) -> Duration {
		Duration::from_millis(self.new_context_timeout_ms)
	}
}

use std::path::Path;

use anyhow::Context as _;
use tabwright::OrchestratorConfig;
use tracing::debug;

use crate::output::OutputFormat;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
	pub format: OutputFormat,
	pub config: OrchestratorConfig,
}

impl CommandContext {
	/// Reads the config file when given, then applies `TABWRIGHT_*` overrides.
	pub fn load(format: OutputFormat, config_path: Option<&Path>) -> anyhow::Result<Self> {
		let config = match config_path {
			Some(path) => {
				debug!(target = "tabwright", path = %path.display(), "loading config");
				OrchestratorConfig::from_file(path).with_context(|| format!("failed to load config from {}", path.display()))?
			}
			None => OrchestratorConfig::default(),
		};
		let config = config.with_env_overrides().context("invalid TABWRIGHT_* override")?;
		Ok(Self { format, config })
	}
}

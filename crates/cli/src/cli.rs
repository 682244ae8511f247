use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tabwright")]
#[command(about = "Inspect provider patterns and replay tab-workflow scripts")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Orchestrator config file (JSON); TABWRIGHT_* variables override it
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// List the built-in identity providers and application-tracking systems
	Providers,

	/// Classify a URL against the provider, ATS and verification patterns
	Classify {
		url: String,
		/// Page title, used by the verification heuristics
		#[arg(long, default_value = "")]
		title: String,
	},

	/// Replay a JSON script of tab and session steps against an in-memory host
	Replay {
		#[arg(value_name = "SCRIPT")]
		script: PathBuf,
	},
}

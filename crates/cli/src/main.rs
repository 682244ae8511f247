use clap::Parser;
use tabwright_cli::cli::Cli;
use tabwright_cli::context::CommandContext;
use tabwright_cli::{commands, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let result = match CommandContext::load(cli.format, cli.config.as_deref()) {
		Ok(ctx) => commands::dispatch(cli.command, &ctx).await,
		Err(err) => Err(err),
	};

	if let Err(err) = result {
		error!(target = "tabwright", error = %format!("{err:#}"), "command failed");
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

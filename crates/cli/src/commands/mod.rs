mod classify;
mod providers;
pub mod replay;

use crate::cli::Commands;
use crate::context::CommandContext;

pub async fn dispatch(command: Commands, ctx: &CommandContext) -> anyhow::Result<()> {
	match command {
		Commands::Providers => providers::execute(ctx),
		Commands::Classify { url, title } => classify::execute(&url, &title, ctx),
		Commands::Replay { script } => replay::execute(&script, ctx).await,
	}
}

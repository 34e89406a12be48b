pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use handlers::Context;
use ingest_core::config::Config;
use ingest_core::error::Result;

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let ctx = Context::open(config)?;
    match cli.command {
        Commands::Run { interval, once } => handlers::handle_run(ctx, interval, once).await,
        Commands::Trigger { message } => handlers::handle_trigger_message(&ctx, &message).map(drop),
        Commands::Pass => handlers::handle_pass(&ctx).map(drop),
        Commands::Validate { title, asset } => {
            handlers::handle_validate(&ctx, title, asset).map(drop)
        }
        Commands::Register {
            title,
            asset,
            status,
            created,
            prefix,
        } => handlers::handle_register(&ctx, title, asset, status, created, prefix).map(drop),
        Commands::Status { status } => handlers::handle_status(&ctx, status).map(drop),
        Commands::Reset { title, asset, to } => {
            handlers::handle_reset(&ctx, title, asset, to).map(drop)
        }
        Commands::Sweep => handlers::handle_sweep(&ctx).map(drop),
    }
}

//! LoFi generator command line

mod args;
mod commands;

use args::{Cli, Command};
use clap::Parser;
use commands::AppContext;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::debug!("lofi {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Devices { json } => commands::devices(json),
        Command::Inspect { file, json } => commands::inspect(&file, json).await,
        command => {
            let ctx = AppContext::load(cli.config_dir).await?;
            match command {
                Command::Export {
                    input,
                    output,
                    effects,
                } => commands::export(&ctx, &input, output, &effects).await,
                Command::Play {
                    input,
                    start,
                    end,
                    device,
                    meter,
                    effects,
                } => commands::play(&ctx, &input, start, end, device, meter, &effects).await,
                Command::Presets { action } => commands::presets(&ctx, action).await,
                Command::Config { action } => commands::config(&ctx, action).await,
                Command::Devices { .. } | Command::Inspect { .. } => Ok(()),
            }
        }
    }
}

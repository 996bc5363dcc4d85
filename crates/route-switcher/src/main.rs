use anyhow::Result;
use clap::Parser;
use rsw_config::{Settings, validate_settings};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .ok();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?.with_overrides(cli.overrides.into());
    let settings = validate_settings(settings)?;

    match cli.command {
        Commands::Run => commands::run(&settings).await,
        Commands::Once => commands::once(&settings).await,
        Commands::Check => commands::check(&settings).await,
        Commands::Unlock => commands::unlock(&settings).await,
    }
}

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = registry_core::load_settings()?;
    cli.apply_overrides(&mut settings);
    registry_core::init_tracing("registry-ctl", &settings.log_level, settings.json_log)?;
    debug!(?settings, "settings resolved");
    commands::run(cli.command, &settings).await
}

use std::process::ExitCode;

use clap::Parser;
use scalewatchd::cli::{Cli, Command};
use scalewatchd::commands;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,scalewatchd=debug,scalewatch=debug";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, port } => commands::run(&config, port).await?,
        Command::Cycle { config, services } => {
            if !commands::cycle(&config, &services).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Validate { config } => commands::validate(&config)?,
        Command::Secrets { config, action } => commands::secrets(&config, action).await?,
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

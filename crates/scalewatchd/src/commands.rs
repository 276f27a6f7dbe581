//! Subcommand bodies.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, bail};
use scalewatch_core::WatchConfig;
use scalewatch_core::config::SecretsConfig;
use tokio::sync::watch;
use tracing::{error, info};

use crate::cli::SecretsAction;
use crate::wiring;

pub fn load_config(path: &Path) -> anyhow::Result<WatchConfig> {
    let config = WatchConfig::from_file(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// `scalewatchd run`: scheduled loop plus REST API until Ctrl-C.
pub async fn run(config_path: &Path, port: u16) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let interval = config.interval()?;
    let components = wiring::build(&config).await?;
    info!(config = %config_path.display(), "scalewatch daemon starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let decisions = components.decisions.clone();
    let loop_handle = tokio::spawn(async move {
        decisions.run(interval, shutdown_rx).await;
    });

    let router = scalewatch_api::build_router(components.api_state());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = loop_handle.await;
    info!("scalewatch daemon stopped");
    Ok(())
}

/// `scalewatchd cycle`: one evaluation, reports printed as JSON.
///
/// Returns whether every cycle succeeded.
pub async fn cycle(config_path: &Path, services: &[String]) -> anyhow::Result<bool> {
    let config = load_config(config_path)?;
    let known = config.service_ids();
    if let Some(unknown) = services.iter().find(|s| !known.contains(s)) {
        bail!("service {unknown} is not configured");
    }

    let components = wiring::build(&config).await?;
    let reports = if services.is_empty() {
        components.decisions.run_all().await
    } else {
        components.decisions.run_many(services).await
    };

    println!("{}", serde_json::to_string_pretty(&reports)?);
    let expected = if services.is_empty() {
        known.len()
    } else {
        services.len()
    };
    Ok(reports.len() == expected && reports.iter().all(|r| r.is_success()))
}

/// `scalewatchd validate`.
pub fn validate(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!(
        "{}: ok ({} services, every {})",
        config_path.display(),
        config.services.len(),
        config.cycle.interval
    );
    Ok(())
}

/// `scalewatchd secrets ...` against the configured backend.
pub async fn secrets(config_path: &Path, action: SecretsAction) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = match config.secrets {
        SecretsConfig::Local => Some(wiring::open_store(&config)?),
        SecretsConfig::Env { .. } => None,
    };
    let resolver = wiring::secret_resolver(&config, store.as_ref())?;

    match action {
        SecretsAction::List => {
            for key in resolver.get_all().await?.keys() {
                println!("{key}");
            }
        }
        SecretsAction::Get { key } => println!("{}", resolver.get(&key).await?),
        SecretsAction::Set { key, value } => {
            resolver.set(&key, &value).await?;
            println!("{key} written");
        }
        SecretsAction::Delete { key } => {
            if resolver.delete(&key).await? {
                println!("{key} deleted");
            } else {
                println!("{key} not found");
            }
        }
    }
    Ok(())
}

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stalker_relay::{config::Config, context::AppContext, services::RelayOrchestrator};

#[derive(Parser)]
#[command(name = "stalker-relay")]
#[command(version)]
#[command(about = "Relays Stalker portal channel lineups as HLS playlists and a portal proxy")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Address relay listeners bind to
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("stalker_relay={},tower_http=trace", cli.log_level)
    } else {
        format!("stalker_relay={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stalker relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    config.validate()?;

    if config.profiles.is_empty() {
        warn!("No profiles configured in {}; nothing to relay", cli.config);
    }

    let profiles = config.profiles.clone();
    let ctx = Arc::new(AppContext::new(config)?);
    let orchestrator = RelayOrchestrator::new(ctx);

    for (id, result) in orchestrator.start_all(&profiles).await {
        match result {
            Ok(state) => info!(
                "Profile {} running: {} channels, hls {}, proxy {}",
                id,
                state.channels,
                state.hls.as_deref().unwrap_or("disabled"),
                state.proxy.as_deref().unwrap_or("disabled")
            ),
            Err(e) => error!("Profile {} failed to start: {}", id, e),
        }
    }

    shutdown_signal().await;
    info!("Shutting down relays");
    orchestrator.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                }
                return;
            }
            _ => warn!("Failed to install unix signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down gracefully");
}

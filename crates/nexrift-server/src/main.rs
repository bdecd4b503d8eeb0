//! NexRift Server - HTTP API over the NexRift supervisor.
//!
//! Serves the app dashboard's REST API and stops every supervised app before
//! exiting on SIGINT/SIGTERM.

mod handlers;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use nexrift_core::config::{AppConfigDefaults, PathsConfig};
use nexrift_core::{JsonConfigStore, ResourceTracker, ShutdownCoordinator, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "nexrift-server")]
#[command(about = "Process supervisor and HTTP API for locally hosted apps")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = AppConfigDefaults::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Path to the app config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting {} server", AppConfigDefaults::APP_NAME);

    let config_path = args.config.unwrap_or_else(default_config_path);
    info!("App config: {}", config_path.display());

    let store = JsonConfigStore::open_or_create(&config_path)
        .with_context(|| format!("loading app config from {}", config_path.display()))?;
    let supervisor = Supervisor::builder(Arc::new(store))
        .with_metrics(Arc::new(ResourceTracker::default()))
        .build();

    let addr = server::start_server(supervisor.clone(), &args.host, args.port).await?;

    // Intentional stdout so wrappers can discover an auto-assigned port
    println!("NEXRIFT_PORT={}", addr.port());

    info!("API running on http://{}", addr);

    wait_for_signal().await?;
    info!("Shutdown signal received, stopping supervised apps");

    let report = ShutdownCoordinator::new(supervisor).shutdown().await;
    if !report.is_clean() {
        warn!(
            "Exiting with {} app(s) not stopped cleanly: {:?}",
            report.failed.len(),
            report.failed
        );
    }

    Ok(())
}

/// `<config dir>/nexrift/apps_config.json`, or the working directory when the
/// platform has no config dir.
fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir
            .join(PathsConfig::CONFIG_DIR_NAME)
            .join(PathsConfig::CONFIG_FILE_NAME),
        None => PathBuf::from(PathsConfig::CONFIG_FILE_NAME),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

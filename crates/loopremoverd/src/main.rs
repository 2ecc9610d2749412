//! loopremoverd - Loop-Prevention Topology Daemon
//!
//! Entry point for the loopremoverd daemon. Reads topology links from APPL_DB
//! and maintains per-port loop-prevention status in STATE_DB.

use anyhow::Context;
use clap::Parser;
use sonic_loopremoverd::config::DEFAULT_CONFIG_PATH;
use sonic_loopremoverd::{LoopRemover, LoopRemoverConfig, RedisLinkFeed, RedisPortStatusStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "loopremoverd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Topology instance to manage, overriding the configuration file
    #[arg(short = 't', long)]
    topology_id: Option<String>,
}

/// Initializes tracing/logging subsystem
fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting loopremoverd ---");

    match run(args).await {
        Ok(()) => {
            info!("loopremoverd: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "loopremoverd: Daemon exiting with error");
            Err(e)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = LoopRemoverConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(topology_id) = args.topology_id {
        config.topology.topology_id = topology_id;
    }
    config.validate().context("validating configuration")?;

    let db = &config.database;
    let store = RedisPortStatusStore::connect(&db.redis_host, db.redis_port, db.state_db)
        .await
        .context("connecting to STATE_DB")?;
    let feed = RedisLinkFeed::connect(
        &db.redis_host,
        db.redis_port,
        db.appl_db,
        &config.topology.topology_id,
        config.poll_interval(),
    )
    .await
    .context("connecting to APPL_DB")?;

    let engine = LoopRemover::new(&config, Arc::new(store));
    engine
        .request_refresh()
        .context("scheduling startup reconciliation")?;
    let cancel = CancellationToken::new();

    let feed_task = feed.run(&engine, cancel.clone());
    tokio::pin!(feed_task);

    tokio::select! {
        _ = &mut feed_task => warn!("loopremoverd: Topology feed exited"),
        _ = shutdown_signal() => {
            info!("loopremoverd: Received shutdown signal");
            cancel.cancel();
            feed_task.await;
        }
    }

    engine.shutdown().await;
    info!(stats = ?engine.stats(), "loopremoverd: Graceful shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["loopremoverd"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.log_level, "info");
        assert!(args.topology_id.is_none());
    }

    #[test]
    fn test_override_args() {
        let args = Args::parse_from(["loopremoverd", "-c", "/tmp/lr.toml", "-t", "flow:2"]);
        assert_eq!(args.config, PathBuf::from("/tmp/lr.toml"));
        assert_eq!(args.topology_id.as_deref(), Some("flow:2"));
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dubber::config::Config;
use dubber::constants::{DEFAULT_CONFIG_FILE, DEFAULT_METRICS_ADDR, DEFAULT_POLL_INTERVAL};
use dubber::metrics::Metrics;
use dubber::server::{serve_metrics, Server};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// dubber provisions DNS names for dynamic services.
#[derive(Debug, Parser)]
#[command(
    name = "dubber",
    version,
    about = "dubber provisions DNS names for dynamic services",
    long_about = "A tool for dynamically updating DNS providers based on applications\n\
                  discovered from orchestration tools."
)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Listen address for the metrics endpoint; empty disables it.
    #[arg(long, value_name = "HOST:PORT", default_value = DEFAULT_METRICS_ADDR)]
    addr: String,

    /// Log the changes that would be applied without applying them.
    #[arg(long)]
    dry_run: bool,

    /// Run one discovery and reconcile cycle per discoverer, then exit.
    #[arg(long)]
    oneshot: bool,

    /// Interval between discovery polls.
    #[arg(
        long = "poll.interval",
        value_name = "DURATION",
        default_value = DEFAULT_POLL_INTERVAL,
        value_parser = humantime::parse_duration
    )]
    poll_interval: Duration,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dubber")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

/// Initialize logging with custom format.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level. Respects
/// `RUST_LOG_FORMAT` for the output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    initialize_logging();
    info!(config = %args.config.display(), dry_run = args.dry_run, "starting dubber");

    let cfg = Config::from_file(&args.config)
        .with_context(|| format!("unable to load config {}", args.config.display()))?;

    let provisioners = cfg
        .build_provisioners(args.dry_run)
        .await
        .context("building provisioners")?;
    let discoverers = cfg
        .build_discoverers()
        .await
        .context("building discoverers")?;
    if discoverers.is_empty() {
        warn!("no discoverers configured; nothing will be reconciled");
    }

    let metrics = Arc::new(Metrics::new(Registry::new()).context("registering metrics")?);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let metrics_handle = if args.addr.is_empty() {
        debug!("metrics endpoint disabled");
        None
    } else {
        let addr = listen_addr(&args.addr);
        Some(serve_metrics(&addr, metrics.clone(), shutdown.clone()).await?)
    };

    let server = Server::new(
        discoverers,
        provisioners,
        metrics,
        args.poll_interval,
        args.oneshot,
    );
    server.run(shutdown.clone()).await?;

    // Stop the metrics server on the way out of a oneshot run too.
    shutdown.cancel();
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    info!("shutdown complete");
    Ok(())
}

/// Cancel the token on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to wait for SIGINT");
            }
            info!("received SIGINT, initiating graceful shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
    shutdown.cancel();
}

/// Expand a `:port` listen address to all interfaces.
fn listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The scheduler: drives discoverers on timers, fans their zone updates
//! into a single aggregator, and dispatches per-zone reconciles.
//!
//! One task per discoverer runs a ticker and sends `(index, Zone)` updates
//! over an mpsc channel. The aggregator is the sole consumer: it replaces
//! the discoverer's slot in the latest-zone buffer, concatenates all
//! current zones, partitions the result by the provisioned zone names, and
//! reconciles each fragment in turn. Reconciles on the same zone can never
//! overlap because the aggregator is single-threaded.
//!
//! Cancelling the token passed to [`Server::run`] interrupts ticker waits,
//! in-flight pulls and the aggregator loop promptly. In oneshot mode every
//! discoverer runs exactly one pull, the aggregator drains the channel,
//! and `run` returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discoverer::Discoverer;
use crate::metrics::{Metrics, STATUS_FAILED, STATUS_SUCCESS};
use crate::provisioner::Provisioner;
use crate::reconcile::reconcile_zone;
use crate::zone::Zone;

/// The scheduler for a set of discoverers and provisioners.
pub struct Server {
    discoverers: Vec<Arc<Discoverer>>,
    provisioners: HashMap<String, Box<dyn Provisioner>>,
    zones: Vec<String>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    oneshot: bool,
}

impl Server {
    pub fn new(
        discoverers: Vec<Discoverer>,
        provisioners: HashMap<String, Box<dyn Provisioner>>,
        metrics: Arc<Metrics>,
        poll_interval: Duration,
        oneshot: bool,
    ) -> Self {
        let zones = provisioners.keys().cloned().collect();
        Server {
            discoverers: discoverers.into_iter().map(Arc::new).collect(),
            provisioners,
            zones,
            metrics,
            poll_interval,
            oneshot,
        }
    }

    /// Run the scheduler until the token is cancelled, or until one full
    /// cycle has completed in oneshot mode.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            discoverers = self.discoverers.len(),
            zones = ?self.zones,
            poll_interval = ?self.poll_interval,
            oneshot = self.oneshot,
            "starting scheduler"
        );
        self.metrics
            .active_discoverers
            .set(self.discoverers.len() as i64);

        let (tx, mut rx) = mpsc::channel::<(usize, Zone)>(self.discoverers.len().max(1));

        let mut loops = Vec::new();
        for (index, discoverer) in self.discoverers.iter().enumerate() {
            loops.push(tokio::spawn(discover_loop(
                index,
                discoverer.clone(),
                tx.clone(),
                self.metrics.clone(),
                shutdown.clone(),
                self.poll_interval,
                self.oneshot,
            )));
        }
        // The aggregator's receiver closes once every discoverer loop has
        // dropped its sender; that is the oneshot exit condition.
        drop(tx);

        let mut dzones: Vec<Option<Zone>> = vec![None; self.discoverers.len()];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
                update = rx.recv() => match update {
                    Some((index, zone)) => self.handle_update(&mut dzones, index, zone).await,
                    None => {
                        debug!("all discoverer loops finished");
                        break;
                    }
                }
            }
        }

        // Release the channel before joining so no loop stays blocked on a
        // full send.
        drop(rx);
        for handle in loops {
            handle.await.context("discoverer loop panicked")?;
        }
        Ok(())
    }

    /// Process one discoverer update: replace its slot, rebuild the full
    /// desired zone, and reconcile every provisioned zone it touches.
    async fn handle_update(&self, dzones: &mut [Option<Zone>], index: usize, zone: Zone) {
        debug!(
            discoverer = self.discoverers[index].name(),
            records = zone.len(),
            "received zone update"
        );
        dzones[index] = Some(zone);

        let mut full = Zone::new();
        for zone in dzones.iter().flatten() {
            full.extend(zone.clone());
        }

        for (zone_name, fragment) in full.partition(&self.zones) {
            let Some(prov) = self.provisioners.get(&zone_name) else {
                // Partition only emits the domains we passed in.
                continue;
            };

            let timer = self
                .metrics
                .reconcile_time
                .with_label_values(&[&zone_name])
                .start_timer();
            let result = reconcile_zone(prov.as_ref(), &fragment).await;
            timer.observe_duration();

            match result {
                Ok(outcome) => {
                    self.metrics
                        .reconcile_runs
                        .with_label_values(&[STATUS_SUCCESS])
                        .inc();
                    self.metrics
                        .discovered_serial
                        .with_label_values(&[&zone_name])
                        .set(i64::from(outcome.old_serial));
                    self.metrics
                        .provisioned_serial
                        .with_label_values(&[&zone_name])
                        .set(i64::from(outcome.new_serial));
                    if outcome.changed {
                        info!(
                            zone = %zone_name,
                            old_serial = outcome.old_serial,
                            new_serial = outcome.new_serial,
                            "zone updated"
                        );
                    } else {
                        debug!(zone = %zone_name, "zone already up to date");
                    }
                }
                Err(e) => {
                    warn!(zone = %zone_name, error = format!("{e:#}"), "reconcile failed");
                    self.metrics
                        .reconcile_runs
                        .with_label_values(&[STATUS_FAILED])
                        .inc();
                }
            }
        }
    }
}

/// One discoverer's poll loop.
async fn discover_loop(
    index: usize,
    discoverer: Arc<Discoverer>,
    tx: mpsc::Sender<(usize, Zone)>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    oneshot: bool,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = discoverer.discover() => result,
        };

        match result {
            Ok(zone) => {
                metrics
                    .discoverer_runs
                    .with_label_values(&[STATUS_SUCCESS])
                    .inc();
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    sent = tx.send((index, zone)) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    discoverer = discoverer.name(),
                    error = format!("{e:#}"),
                    "discovery failed"
                );
                metrics
                    .discoverer_runs
                    .with_label_values(&[STATUS_FAILED])
                    .inc();
            }
        }

        if oneshot {
            return;
        }
    }
}

/// Serve `GET /` (liveness) and `GET /metrics` (Prometheus exposition) on
/// the given address until the token is cancelled.
pub async fn serve_metrics(
    addr: &str,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    async fn root_handler() -> &'static str {
        "OK"
    }

    async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> String {
        match metrics.gather() {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to gather metrics");
                String::from("# error gathering metrics\n")
            }
        }
    }

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics server to {addr}"))?;
    info!(addr = %addr, "metrics server listening");

    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "metrics server error");
        }
    }))
}

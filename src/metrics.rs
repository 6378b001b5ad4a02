// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the dubber scheduler.
//!
//! All metrics live in a registry injected at construction, so tests and
//! embedders can run isolated instances side by side. The `/metrics`
//! endpoint encodes this registry in the Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Label value for successful discoverer/reconcile runs.
pub const STATUS_SUCCESS: &str = "success";
/// Label value for failed discoverer/reconcile runs.
pub const STATUS_FAILED: &str = "failed";

/// The dubber metric set.
pub struct Metrics {
    registry: Registry,

    /// Number of discoverers the scheduler is polling.
    pub active_discoverers: IntGauge,
    /// Discoverer runs by status.
    pub discoverer_runs: IntCounterVec,
    /// Reconcile runs by status.
    pub reconcile_runs: IntCounterVec,
    /// Reconcile latency per zone.
    pub reconcile_time: HistogramVec,
    /// The remote SOA serial seen before the last change, per zone.
    pub discovered_serial: IntGaugeVec,
    /// The SOA serial installed by the last change, per zone.
    pub provisioned_serial: IntGaugeVec,
}

impl Metrics {
    /// Create and register the metric set in the given registry.
    pub fn new(registry: Registry) -> Result<Self, prometheus::Error> {
        let active_discoverers = IntGauge::new(
            "dubber_active_discoverers",
            "Number of discoverers the scheduler is polling",
        )?;
        registry.register(Box::new(active_discoverers.clone()))?;

        let discoverer_runs = IntCounterVec::new(
            Opts::new(
                "dubber_discoverer_runs_total",
                "Total number of discoverer runs by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(discoverer_runs.clone()))?;

        let reconcile_runs = IntCounterVec::new(
            Opts::new(
                "dubber_reconcile_runs_total",
                "Total number of zone reconcile runs by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(reconcile_runs.clone()))?;

        let reconcile_time = HistogramVec::new(
            HistogramOpts::new(
                "dubber_reconcile_time_seconds",
                "Duration of zone reconciles in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
            &["zone"],
        )?;
        registry.register(Box::new(reconcile_time.clone()))?;

        let discovered_serial = IntGaugeVec::new(
            Opts::new(
                "dubber_zone_serial_discovered",
                "The remote SOA serial observed before the last reconcile, by zone",
            ),
            &["zone"],
        )?;
        registry.register(Box::new(discovered_serial.clone()))?;

        let provisioned_serial = IntGaugeVec::new(
            Opts::new(
                "dubber_zone_serial_provisioned",
                "The SOA serial installed by the last reconcile, by zone",
            ),
            &["zone"],
        )?;
        registry.register(Box::new(provisioned_serial.clone()))?;

        Ok(Metrics {
            registry,
            active_discoverers,
            discoverer_runs,
            reconcile_runs,
            reconcile_time,
            discovered_serial,
            provisioned_serial,
        })
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("utf-8 error: {e}")))
    }
}

//! Metrics initialization for Prometheus exporter.
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

pub const QUERIES_TOTAL: &str = "sinkhole_queries_total";
pub const BLOCKED_TOTAL: &str = "sinkhole_blocked_total";
pub const FORWARDED_TOTAL: &str = "sinkhole_forwarded_total";
pub const RELAY_FAILURES_TOTAL: &str = "sinkhole_relay_failures_total";
pub const DROPPED_TOTAL: &str = "sinkhole_dropped_total";

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| Error::Metrics(err.to_string()))?;

    describe();
    Ok(())
}

fn describe() {
    metrics::describe_counter!(QUERIES_TOTAL, "Queries classified");
    metrics::describe_counter!(BLOCKED_TOTAL, "Queries answered with NXDOMAIN");
    metrics::describe_counter!(FORWARDED_TOTAL, "Queries relayed upstream and answered");
    metrics::describe_counter!(RELAY_FAILURES_TOTAL, "Relays that timed out or failed");
    metrics::describe_counter!(DROPPED_TOTAL, "Packets dropped without an answer");
}

pub(crate) fn record_query() {
    metrics::counter!(QUERIES_TOTAL).increment(1);
}

pub(crate) fn record_block(list: &'static str) {
    metrics::counter!(BLOCKED_TOTAL, "list" => list).increment(1);
}

pub(crate) fn record_forward() {
    metrics::counter!(FORWARDED_TOTAL).increment(1);
}

pub(crate) fn record_relay_failure() {
    metrics::counter!(RELAY_FAILURES_TOTAL).increment(1);
}

pub(crate) fn record_drop(reason: &'static str) {
    metrics::counter!(DROPPED_TOTAL, "reason" => reason).increment(1);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `topology_sweeps_total` (counter): completed sweeps
//! - `topology_sweep_failures_total` (counter): sweeps aborted by an error
//! - `topology_sweep_duration_seconds` (histogram): probe + merge time per sweep
//! - `topology_targets` / `topology_targets_online` (gauge): last sweep's view
//! - `topology_store_commits_total` (counter): applied documents
//! - `topology_store_persist_failures_total` (counter): failed durable writes
//! - `topology_store_reloads_total` (counter, by file): external edits picked up
//! - `topology_priority_expired_total` (counter): expired priority markers

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_sweep(duration: Duration, targets: usize, online: usize) {
    counter!("topology_sweeps_total").increment(1);
    histogram!("topology_sweep_duration_seconds").record(duration.as_secs_f64());
    gauge!("topology_targets").set(targets as f64);
    gauge!("topology_targets_online").set(online as f64);
}

pub fn record_sweep_failure() {
    counter!("topology_sweep_failures_total").increment(1);
}

pub fn record_commit() {
    counter!("topology_store_commits_total").increment(1);
}

pub fn record_persist_failure() {
    counter!("topology_store_persist_failures_total").increment(1);
}

pub fn record_reload(file: &'static str) {
    counter!("topology_store_reloads_total", "file" => file).increment(1);
}

pub fn record_priority_expired(count: usize) {
    counter!("topology_priority_expired_total").increment(count as u64);
}

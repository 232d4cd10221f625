//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files, and
//! every default matches the monitor's documented cadence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the topology monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Durable document location and background loop cadence.
    pub store: StoreConfig,

    /// Probe sweep settings.
    pub probe: ProbeConfig,

    /// Change fan-out settings.
    pub events: EventsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Shared state store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the topology document.
    pub data_path: PathBuf,

    /// Path of the trusted hostname list (defaults to a sibling of `data_path`).
    pub trusted_hostnames_path: Option<PathBuf>,

    /// Retry interval for writes that failed inside `apply`.
    pub flush_interval_secs: u64,

    /// Poll interval for out-of-band edits to either durable file.
    pub external_poll_secs: u64,

    /// Interval of the priority marker expiry sweep.
    pub priority_sweep_secs: u64,

    /// Lifetime of a priority marker.
    pub priority_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("topology.json"),
            trusted_hostnames_path: None,
            flush_interval_secs: 10,
            external_poll_secs: 5,
            priority_sweep_secs: 60,
            priority_ttl_secs: 300,
        }
    }
}

impl StoreConfig {
    /// Store configuration rooted at `data_path` with default cadence.
    pub fn at(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Self::default()
        }
    }

    pub fn trusted_path(&self) -> PathBuf {
        match &self.trusted_hostnames_path {
            Some(path) => path.clone(),
            None => self.data_path.with_file_name("trusted_hostnames.json"),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn external_poll_interval(&self) -> Duration {
        Duration::from_secs(self.external_poll_secs)
    }

    pub fn priority_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.priority_sweep_secs)
    }

    pub fn priority_ttl(&self) -> Duration {
        Duration::from_secs(self.priority_ttl_secs)
    }
}

/// Liveness probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Enable the sweep loop.
    pub enabled: bool,

    /// Echo requests per address during a regular sweep.
    pub normal_attempts: u32,

    /// Per-attempt reply timeout during a regular sweep.
    pub normal_timeout_ms: u64,

    /// Echo requests per priority address.
    pub priority_attempts: u32,

    /// Per-attempt reply timeout for priority addresses.
    pub priority_timeout_ms: u64,

    /// Addresses probed together as one batch.
    pub chunk_size: usize,

    /// Batches in flight at once (defaults to min(available cores, 4)).
    pub max_workers: Option<usize>,

    /// Minimum pause between sweeps.
    pub base_interval_secs: u64,

    /// Minimum pause between sweeps while any priority marker is set.
    pub priority_interval_secs: u64,

    /// Pause grows to `elapsed * backoff_multiplier` when sweeps run long.
    pub backoff_multiplier: f64,

    /// Pause after a failed sweep.
    pub failure_cooldown_secs: u64,

    /// Pause when the store holds no hosts.
    pub empty_backoff_secs: u64,

    /// Pending out-of-band probe requests before senders wait.
    pub trigger_capacity: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normal_attempts: 2,
            normal_timeout_ms: 2000,
            priority_attempts: 3,
            priority_timeout_ms: 1000,
            chunk_size: 50,
            max_workers: None,
            base_interval_secs: 30,
            priority_interval_secs: 10,
            backoff_multiplier: 1.5,
            failure_cooldown_secs: 60,
            empty_backoff_secs: 60,
            trigger_capacity: 64,
        }
    }
}

impl ProbeConfig {
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(4)
        })
    }
}

/// Change notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Documents buffered per subscriber before it starts lagging.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

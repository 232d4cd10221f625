//! Liveness prober contract.

use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::ProbeConfig;
use crate::topology::Status;

/// Result of probing one address. Never an error: failures are `dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    alive: bool,
    latency_ms: Option<u64>,
}

impl ProbeOutcome {
    pub fn alive(latency_ms: u64) -> Self {
        Self {
            alive: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn dead() -> Self {
        Self {
            alive: false,
            latency_ms: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    pub fn status(&self) -> Status {
        if self.alive {
            Status::Online
        } else {
            Status::Offline
        }
    }
}

/// How hard to try before declaring an address dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub attempts: u32,
    pub timeout: Duration,
}

impl ProbePolicy {
    pub fn normal(config: &ProbeConfig) -> Self {
        Self {
            attempts: config.normal_attempts,
            timeout: Duration::from_millis(config.normal_timeout_ms),
        }
    }

    /// More attempts with a shorter wait, for addresses under a priority marker.
    pub fn priority(config: &ProbeConfig) -> Self {
        Self {
            attempts: config.priority_attempts,
            timeout: Duration::from_millis(config.priority_timeout_ms),
        }
    }
}

/// Checks whether a single address is reachable.
///
/// Implementations must be total: timeouts, transport errors and
/// permission problems all resolve to [`ProbeOutcome::dead`].
pub trait Prober: Send + Sync + 'static {
    fn check(&self, ip: Ipv4Addr, priority: bool) -> impl Future<Output = ProbeOutcome> + Send;
}

//! Folding probe results into a topology document.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::probe::prober::ProbeOutcome;
use crate::topology::{Status, TopologyDocument};

pub type ProbeResults = HashMap<Ipv4Addr, ProbeOutcome>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub hosts_updated: usize,
    pub connections_updated: usize,
    /// Updated records (hosts and connections) now online.
    pub online: usize,
}

/// Overwrite `status` and `latency_ms` of every host and connection with a
/// result; records without one are left untouched.
pub fn merge_results(document: &mut TopologyDocument, results: &ProbeResults) -> MergeStats {
    let mut stats = MergeStats::default();

    for host in &mut document.hosts {
        if let Some(outcome) = results.get(&host.ip) {
            write_liveness(&mut host.status, &mut host.latency_ms, outcome);
            stats.hosts_updated += 1;
            stats.online += usize::from(outcome.is_alive());
        }

        for connection in &mut host.connections {
            if let Some(outcome) = results.get(&connection.ip) {
                write_liveness(&mut connection.status, &mut connection.latency_ms, outcome);
                stats.connections_updated += 1;
                stats.online += usize::from(outcome.is_alive());
            }
        }
    }

    stats
}

fn write_liveness(status: &mut Status, latency_ms: &mut Option<u64>, outcome: &ProbeOutcome) {
    *status = outcome.status();
    *latency_ms = outcome.latency_ms();
}

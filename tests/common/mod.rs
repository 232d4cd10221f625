//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use topology_monitor::config::{ProbeConfig, StoreConfig};
use topology_monitor::events::BroadcastNotifier;
use topology_monitor::probe::{ProbeOutcome, Prober};
use topology_monitor::SharedStateStore;

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

/// A prober answering from a fixed table; unknown addresses are dead.
///
/// Clones share their call log, so a test can keep one after handing the
/// prober to a scheduler.
#[derive(Clone, Default)]
pub struct ScriptedProber {
    script: Arc<Script>,
}

#[derive(Default)]
struct Script {
    answers: HashMap<Ipv4Addr, ProbeOutcome>,
    delay: Duration,
    panic_pending: AtomicBool,
    calls: Mutex<Vec<(Ipv4Addr, bool)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(answers: impl IntoIterator<Item = (Ipv4Addr, ProbeOutcome)>) -> Self {
        Self::scripted(answers.into_iter().collect(), Duration::ZERO)
    }

    /// Every probe sleeps `delay` before answering.
    pub fn slow(answers: impl IntoIterator<Item = (Ipv4Addr, ProbeOutcome)>, delay: Duration) -> Self {
        Self::scripted(answers.into_iter().collect(), delay)
    }

    /// The first probe panics; every later one answers from the table.
    pub fn panicking_once(answers: impl IntoIterator<Item = (Ipv4Addr, ProbeOutcome)>) -> Self {
        let prober = Self::new(answers);
        prober.script.panic_pending.store(true, Ordering::SeqCst);
        prober
    }

    fn scripted(answers: HashMap<Ipv4Addr, ProbeOutcome>, delay: Duration) -> Self {
        Self {
            script: Arc::new(Script {
                answers,
                delay,
                ..Script::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<(Ipv4Addr, bool)> {
        self.script.calls.lock().unwrap().clone()
    }

    /// Highest number of probes observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.script.peak.load(Ordering::SeqCst)
    }
}

impl Prober for ScriptedProber {
    fn check(&self, ip: Ipv4Addr, priority: bool) -> impl Future<Output = ProbeOutcome> + Send {
        let script = Arc::clone(&self.script);
        async move {
            script.calls.lock().unwrap().push((ip, priority));
            if script.panic_pending.swap(false, Ordering::SeqCst) {
                panic!("scripted failure for {ip}");
            }
            let now = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            script.peak.fetch_max(now, Ordering::SeqCst);

            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }

            script.in_flight.fetch_sub(1, Ordering::SeqCst);
            script.answers.get(&ip).copied().unwrap_or_else(ProbeOutcome::dead)
        }
    }
}

pub fn fast_probe_config() -> ProbeConfig {
    ProbeConfig {
        base_interval_secs: 1,
        priority_interval_secs: 1,
        failure_cooldown_secs: 1,
        empty_backoff_secs: 1,
        ..ProbeConfig::default()
    }
}

/// Open a store on `dir/topology.json` with its own notifier.
pub async fn open_store(dir: &Path) -> (Arc<SharedStateStore>, BroadcastNotifier) {
    open_store_with(StoreConfig::at(dir.join("topology.json"))).await
}

pub async fn open_store_with(config: StoreConfig) -> (Arc<SharedStateStore>, BroadcastNotifier) {
    let notifier = BroadcastNotifier::default();
    let store = SharedStateStore::open(config, Arc::new(notifier.clone())).await;
    (store, notifier)
}

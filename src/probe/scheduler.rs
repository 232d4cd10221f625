//! Probe sweep scheduling.
//!
//! # Cycle
//! ```text
//! Idle → Snapshot → Dispatch → Collect → Merge → Apply → Sleep → Idle
//! ```
//!
//! Targets are split into chunks; a semaphore bounds how many chunks are in
//! flight, and every probe inside a chunk runs concurrently. A failed cycle
//! is logged and followed by a cooldown; the loop only ends on shutdown.

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::observability::metrics;
use crate::probe::merge::{merge_results, ProbeResults};
use crate::probe::prober::{ProbeOutcome, Prober};
use crate::store::{ApplyOutcome, SharedStateStore};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("probe worker failed: {0}")]
    Worker(#[from] JoinError),

    #[error("sweep panicked")]
    Panicked,

    #[error("sweep cancelled")]
    Cancelled,
}

/// Summary of one completed sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub cycle: u64,
    pub hosts: usize,
    /// Distinct addresses probed.
    pub targets: usize,
    /// Hosts and connections found online.
    pub online: usize,
    /// Priority markers set when the sweep started.
    pub priority: usize,
    pub elapsed: Duration,
    pub outcome: ApplyOutcome,
}

/// Requests an immediate probe of one address, outside the sweep cadence.
#[derive(Debug, Clone)]
pub struct ProbeTrigger {
    tx: mpsc::Sender<Ipv4Addr>,
}

impl ProbeTrigger {
    /// Queue a probe of `ip` after an operator edit. Returns false when the
    /// queue is full or the scheduler has stopped; the next sweep covers it.
    pub fn notify_host_mutated(&self, ip: Ipv4Addr) -> bool {
        match self.tx.try_send(ip) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Dropped out-of-band probe request");
                false
            }
        }
    }
}

pub struct ProbeScheduler<P> {
    store: Arc<SharedStateStore>,
    prober: Arc<P>,
    config: ProbeConfig,
    cycles: AtomicU64,
    triggers: Option<mpsc::Receiver<Ipv4Addr>>,
}

impl<P: Prober> ProbeScheduler<P> {
    pub fn new(store: Arc<SharedStateStore>, prober: P, config: ProbeConfig) -> (Self, ProbeTrigger) {
        let (tx, rx) = mpsc::channel(config.trigger_capacity.max(1));
        let scheduler = Self {
            store,
            prober: Arc::new(prober),
            config,
            cycles: AtomicU64::new(0),
            triggers: Some(rx),
        };
        (scheduler, ProbeTrigger { tx })
    }

    /// Run sweeps and out-of-band probes until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        if !self.config.enabled {
            tracing::info!("Probe scheduler disabled");
            return;
        }

        tracing::info!(
            chunk_size = self.config.chunk_size,
            workers = self.config.worker_count(),
            base_interval_secs = self.config.base_interval_secs,
            "Probe scheduler starting"
        );

        let triggers = self.triggers.take();
        let this = &self;
        tokio::join!(this.sweep_loop(&shutdown), async {
            if let Some(triggers) = triggers {
                this.trigger_loop(triggers, &shutdown).await;
            }
        });

        tracing::info!("Probe scheduler stopped");
    }

    async fn sweep_loop(&self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            let cycle = AssertUnwindSafe(self.run_cycle(shutdown)).catch_unwind().await;
            let delay = match cycle.unwrap_or(Err(SweepError::Panicked)) {
                Ok(report) if report.targets == 0 => {
                    tracing::warn!("No hosts to probe");
                    Duration::from_secs(self.config.empty_backoff_secs)
                }
                Ok(report) => self.next_delay(report.elapsed, report.priority > 0),
                Err(SweepError::Cancelled) => break,
                Err(e) => {
                    metrics::record_sweep_failure();
                    tracing::error!(
                        error = %e,
                        cooldown_secs = self.config.failure_cooldown_secs,
                        "Probe sweep failed"
                    );
                    Duration::from_secs(self.config.failure_cooldown_secs)
                }
            };

            tracing::debug!(delay_ms = delay.as_millis() as u64, "Next sweep scheduled");
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn trigger_loop(&self, mut triggers: mpsc::Receiver<Ipv4Addr>, shutdown: &CancellationToken) {
        loop {
            let ip = tokio::select! {
                received = triggers.recv() => match received {
                    Some(ip) => ip,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            tokio::select! {
                _ = self.refresh_address(ip) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }

    /// Run one full sweep: probe every known address and merge the results
    /// into the current document.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let snapshot = self.store.snapshot().await;
        let hosts = snapshot.hosts.len();
        let priority: HashSet<Ipv4Addr> = snapshot.priority_ips.keys().copied().collect();
        let targets = snapshot.probe_targets();
        drop(snapshot);

        if targets.is_empty() {
            return Ok(SweepReport {
                cycle,
                hosts,
                targets: 0,
                online: 0,
                priority: priority.len(),
                elapsed: started.elapsed(),
                outcome: ApplyOutcome::Unchanged,
            });
        }

        tracing::info!(cycle, hosts, targets = targets.len(), priority = priority.len(), "Starting probe sweep");

        let results = self.probe_all(&targets, &priority, shutdown).await?;

        // Merge into the document as it is now, not as it was at the start:
        // edits made while probing survive.
        let (stats, outcome) = self
            .store
            .update(|document| {
                let stats = merge_results(document, &results);
                document.last_update = Some(Utc::now());
                stats
            })
            .await;

        let elapsed = started.elapsed();
        metrics::record_sweep(elapsed, results.len(), stats.online);
        tracing::info!(
            cycle,
            elapsed_ms = elapsed.as_millis() as u64,
            online = stats.online,
            probed = results.len(),
            priority = priority.len(),
            "Probe sweep complete"
        );

        Ok(SweepReport {
            cycle,
            hosts,
            targets: targets.len(),
            online: stats.online,
            priority: priority.len(),
            elapsed,
            outcome,
        })
    }

    /// Probe one address now and merge its result.
    pub async fn refresh_address(&self, ip: Ipv4Addr) -> ProbeOutcome {
        let priority = self.store.snapshot().await.is_priority(ip);
        tracing::info!(ip = %ip, priority, "Probing updated host");

        let outcome = self.prober.check(ip, priority).await;
        let results = ProbeResults::from([(ip, outcome)]);
        self.store
            .update(|document| merge_results(document, &results))
            .await;

        tracing::debug!(ip = %ip, status = %outcome.status(), latency_ms = ?outcome.latency_ms(), "Updated host probed");
        outcome
    }

    /// `max(base, elapsed × multiplier)`, with the shorter base while priority markers exist.
    ///
    /// A product that is not a valid duration falls back to the failure cooldown.
    pub fn next_delay(&self, elapsed: Duration, has_priority: bool) -> Duration {
        let base = if has_priority {
            Duration::from_secs(self.config.priority_interval_secs)
        } else {
            Duration::from_secs(self.config.base_interval_secs)
        };
        let scaled = elapsed.as_secs_f64() * self.config.backoff_multiplier;
        match Duration::try_from_secs_f64(scaled) {
            Ok(scaled) => base.max(scaled),
            Err(e) => {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    multiplier = self.config.backoff_multiplier,
                    error = %e,
                    "Sweep delay out of range, using failure cooldown"
                );
                base.max(Duration::from_secs(self.config.failure_cooldown_secs))
            }
        }
    }

    async fn probe_all(
        &self,
        targets: &[Ipv4Addr],
        priority: &HashSet<Ipv4Addr>,
        shutdown: &CancellationToken,
    ) -> Result<ProbeResults, SweepError> {
        let permits = Arc::new(Semaphore::new(self.config.worker_count()));
        let mut workers = JoinSet::new();

        for chunk in targets.chunks(self.config.chunk_size.max(1)) {
            let batch: Vec<(Ipv4Addr, bool)> = chunk
                .iter()
                .map(|ip| (*ip, priority.contains(ip)))
                .collect();
            let prober = Arc::clone(&self.prober);
            let permits = Arc::clone(&permits);
            let cancel = shutdown.clone();

            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Vec::new();
                };
                tokio::select! {
                    results = probe_chunk(prober, batch) => results,
                    _ = cancel.cancelled() => Vec::new(),
                }
            });
        }

        let mut results: ProbeResults = HashMap::with_capacity(targets.len());
        while let Some(joined) = workers.join_next().await {
            results.extend(joined?);
        }

        if shutdown.is_cancelled() {
            return Err(SweepError::Cancelled);
        }
        Ok(results)
    }
}

async fn probe_chunk<P: Prober>(prober: Arc<P>, batch: Vec<(Ipv4Addr, bool)>) -> Vec<(Ipv4Addr, ProbeOutcome)> {
    let probes = batch.into_iter().map(|(ip, priority)| {
        let prober = Arc::clone(&prober);
        async move { (ip, prober.check(ip, priority).await) }
    });
    join_all(probes).await
}

//! Background loops owned by the store.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::store::shared::SharedStateStore;

impl SharedStateStore {
    /// Run the flush, external-change and priority-expiry loops until
    /// `shutdown` is cancelled, then flush once more.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            flush_secs = self.config.flush_interval_secs,
            poll_secs = self.config.external_poll_secs,
            expiry_secs = self.config.priority_sweep_secs,
            "Store loops starting"
        );

        tokio::join!(
            self.flush_loop(&shutdown),
            self.external_change_loop(&shutdown),
            self.priority_expiry_loop(&shutdown),
        );

        match self.flush().await {
            Ok(true) => tracing::info!("Pending changes flushed on shutdown"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "Final flush failed"),
        }
        tracing::info!("Store loops stopped");
    }

    /// Drop priority markers older than the configured TTL, as of `now`.
    pub async fn expire_priority_markers_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write().await;
        let removed = state.document.expire_priority(now, self.config.priority_ttl());
        if removed > 0 {
            state.dirty = true;
            metrics::record_priority_expired(removed);
            tracing::info!(removed, "Expired priority markers");
        }
        removed
    }

    async fn flush_loop(&self, shutdown: &CancellationToken) {
        let mut ticker = ticker(self.config.flush_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::error!(error = %e, "Periodic flush failed; will retry");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn external_change_loop(&self, shutdown: &CancellationToken) {
        let mut ticker = ticker(self.config.external_poll_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_external_changes().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn priority_expiry_loop(&self, shutdown: &CancellationToken) {
        let mut ticker = ticker(self.config.priority_sweep_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.expire_priority_markers_at(Utc::now()).await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

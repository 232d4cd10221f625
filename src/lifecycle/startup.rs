//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the store (loading or seeding the durable document)
//! - Start the store loops and the probe scheduler under one shutdown
//! - Stop everything in order: cancel, await with a deadline, flush
//!
//! # Design Decisions
//! - Store first, then scheduler (the scheduler reads from the store)
//! - Startup never fails: a missing or corrupt document is seeded

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::MonitorConfig;
use crate::events::BroadcastNotifier;
use crate::lifecycle::shutdown::Shutdown;
use crate::probe::{ProbeScheduler, ProbeTrigger, Prober};
use crate::store::SharedStateStore;

/// Owns the store and every background task.
pub struct Supervisor {
    store: Arc<SharedStateStore>,
    notifier: BroadcastNotifier,
    trigger: ProbeTrigger,
    shutdown: Shutdown,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    pub async fn start<P: Prober>(config: MonitorConfig, prober: P) -> Self {
        let notifier = BroadcastNotifier::new(config.events.capacity);
        let store = SharedStateStore::open(config.store.clone(), Arc::new(notifier.clone())).await;
        let shutdown = Shutdown::new();

        let (scheduler, trigger) = ProbeScheduler::new(Arc::clone(&store), prober, config.probe.clone());

        let mut tasks = Vec::with_capacity(2);

        let store_task = Arc::clone(&store);
        let token = shutdown.subscribe();
        tasks.push(("store", tokio::spawn(async move { store_task.run(token).await })));

        let token = shutdown.subscribe();
        tasks.push(("probe-scheduler", tokio::spawn(scheduler.run(token))));

        tracing::info!(
            data_path = %config.store.data_path.display(),
            tasks = tasks.len(),
            "Topology monitor started"
        );

        Self {
            store,
            notifier,
            trigger,
            shutdown,
            tasks,
        }
    }

    pub fn store(&self) -> &Arc<SharedStateStore> {
        &self.store
    }

    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    pub fn trigger(&self) -> ProbeTrigger {
        self.trigger.clone()
    }

    /// Cancel every task, wait up to `grace` for them, then flush the store.
    pub async fn shutdown(self, grace: Duration) {
        tracing::info!(grace_secs = grace.as_secs(), "Stopping topology monitor");
        self.shutdown.trigger();

        let deadline = Instant::now() + grace;
        for (name, handle) in self.tasks {
            match time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => tracing::warn!(task = name, "Task did not stop before the deadline"),
            }
        }

        if let Err(e) = self.store.flush().await {
            tracing::error!(error = %e, "Final flush failed");
        }
        tracing::info!("Shutdown complete");
    }
}

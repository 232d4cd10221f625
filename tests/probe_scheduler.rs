//! Probe sweeps against a scripted prober and a real store.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use topology_monitor::config::{MonitorConfig, ProbeConfig, StoreConfig};
use topology_monitor::probe::{ProbeOutcome, ProbeScheduler, SweepError};
use topology_monitor::store::ApplyOutcome;
use topology_monitor::topology::{Host, Status, TopologyDocument};
use topology_monitor::{SharedStateStore, Supervisor};

mod common;
use common::{fast_probe_config, ip, open_store, ScriptedProber};

async fn seed(store: &SharedStateStore, hosts: Vec<Host>) {
    store
        .apply(TopologyDocument {
            hosts,
            ..TopologyDocument::default()
        })
        .await;
}

/// Poll the store until `check` holds or five seconds pass.
async fn eventually(store: &SharedStateStore, check: impl Fn(&TopologyDocument) -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check(&store.snapshot().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_cycle_writes_liveness_and_stamps_update() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "core").with_connection(ip(2))]).await;

    let prober = ScriptedProber::new([(ip(1), ProbeOutcome::alive(12))]);
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober, fast_probe_config());

    let before = Utc::now();
    let report = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.cycle, 1);
    assert_eq!(report.hosts, 1);
    assert_eq!(report.targets, 2);
    assert_eq!(report.online, 1);
    assert_eq!(report.outcome, ApplyOutcome::Committed { persisted: true });

    let snapshot = store.snapshot().await;
    let host = &snapshot.hosts[0];
    assert_eq!(host.status, Status::Online);
    assert_eq!(host.latency_ms, Some(12));
    assert_eq!(host.connections[0].status, Status::Offline);
    assert_eq!(host.connections[0].latency_ms, None);
    assert!(snapshot.last_update.unwrap() >= before);

    // Unknown latency is written as -1.
    let raw: Value = serde_json::from_slice(&std::fs::read(dir.path().join("topology.json")).unwrap()).unwrap();
    assert_eq!(raw["hosts"][0]["status"], "online");
    assert_eq!(raw["hosts"][0]["latency_ms"], 12);
    assert_eq!(raw["hosts"][0]["connections"][0]["status"], "offline");
    assert_eq!(raw["hosts"][0]["connections"][0]["latency_ms"], -1);
}

#[tokio::test]
async fn test_shared_addresses_probed_once() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(
        &store,
        vec![
            Host::new(ip(1), "a").with_connection(ip(3)),
            Host::new(ip(2), "b").with_connection(ip(3)).with_connection(ip(1)),
        ],
    )
    .await;

    let prober = ScriptedProber::new([]);
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober.clone(), fast_probe_config());
    let report = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.targets, 3);
    let mut probed: Vec<_> = prober.calls().into_iter().map(|(ip, _)| ip).collect();
    probed.sort();
    assert_eq!(probed, vec![ip(1), ip(2), ip(3)]);
}

#[tokio::test]
async fn test_concurrency_bounded_by_chunks_and_workers() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, (1..=12).map(|n| Host::new(ip(n), format!("h{n}"))).collect()).await;

    let config = ProbeConfig {
        chunk_size: 2,
        max_workers: Some(2),
        ..fast_probe_config()
    };
    let prober = ScriptedProber::slow([], Duration::from_millis(20));
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober.clone(), config);
    scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(prober.calls().len(), 12);
    assert!(prober.peak_in_flight() <= 4, "peak {}", prober.peak_in_flight());
    assert!(prober.peak_in_flight() >= 2);
}

#[tokio::test]
async fn test_priority_addresses_use_priority_policy() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "a"), Host::new(ip(2), "b")]).await;
    store.mark_priority(&[ip(1)]).await;

    let prober = ScriptedProber::new([]);
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober.clone(), fast_probe_config());
    let report = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.priority, 1);
    let mut calls = prober.calls();
    calls.sort();
    assert_eq!(calls, vec![(ip(1), true), (ip(2), false)]);
}

#[tokio::test]
async fn test_edits_during_sweep_survive_merge() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "a")]).await;

    let prober = ScriptedProber::slow([(ip(1), ProbeOutcome::alive(5))], Duration::from_millis(100));
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober, fast_probe_config());

    let token = CancellationToken::new();
    let (report, _) = tokio::join!(scheduler.run_cycle(&token), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .update(|document| {
                document.hosts.push(Host::new(ip(5), "added"));
                document.hosts[0].name = "renamed".into();
            })
            .await
    });
    report.unwrap();

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.hosts.len(), 2);
    assert_eq!(snapshot.hosts[0].name, "renamed");
    assert_eq!(snapshot.hosts[0].status, Status::Online);
    assert_eq!(snapshot.hosts[1].ip, ip(5));
    assert_eq!(snapshot.hosts[1].status, Status::Unknown);
}

#[tokio::test]
async fn test_empty_topology_is_a_noop_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;

    let prober = ScriptedProber::new([]);
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober.clone(), fast_probe_config());
    let report = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.targets, 0);
    assert_eq!(report.outcome, ApplyOutcome::Unchanged);
    assert!(prober.calls().is_empty());
    assert!(store.snapshot().await.last_update.is_none());
}

#[tokio::test]
async fn test_next_delay_backs_off_slow_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    let (scheduler, _trigger) = ProbeScheduler::new(store, ScriptedProber::new([]), ProbeConfig::default());

    assert_eq!(scheduler.next_delay(Duration::from_secs(10), false), Duration::from_secs(30));
    assert_eq!(scheduler.next_delay(Duration::from_secs(40), false), Duration::from_secs(60));
    assert_eq!(scheduler.next_delay(Duration::from_secs(2), true), Duration::from_secs(10));
    assert_eq!(scheduler.next_delay(Duration::from_secs(20), true), Duration::from_secs(30));
}

#[tokio::test]
async fn test_next_delay_out_of_range_uses_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    let config = ProbeConfig {
        backoff_multiplier: f64::INFINITY,
        failure_cooldown_secs: 60,
        ..ProbeConfig::default()
    };
    let (scheduler, _trigger) = ProbeScheduler::new(store, ScriptedProber::new([]), config);

    assert_eq!(scheduler.next_delay(Duration::from_secs(1), false), Duration::from_secs(60));
    assert_eq!(scheduler.next_delay(Duration::ZERO, true), Duration::from_secs(60));
}

#[tokio::test]
async fn test_refresh_address_probes_one_host() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "a"), Host::new(ip(2), "b")]).await;

    let prober = ScriptedProber::new([(ip(2), ProbeOutcome::alive(3))]);
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober.clone(), fast_probe_config());

    let outcome = scheduler.refresh_address(ip(2)).await;
    assert!(outcome.is_alive());
    assert_eq!(prober.calls(), vec![(ip(2), false)]);

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.hosts[0].status, Status::Unknown);
    assert_eq!(snapshot.hosts[1].latency_ms, Some(3));
    assert!(snapshot.last_update.is_none());
}

#[tokio::test]
async fn test_trigger_probes_between_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;

    let config = ProbeConfig {
        empty_backoff_secs: 3600,
        ..fast_probe_config()
    };
    let prober = ScriptedProber::new([(ip(7), ProbeOutcome::alive(9))]);
    let (scheduler, trigger) = ProbeScheduler::new(Arc::clone(&store), prober, config);

    let token = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(token.clone()));

    seed(&store, vec![Host::new(ip(7), "new")]).await;
    assert!(trigger.notify_host_mutated(ip(7)));
    assert!(eventually(&store, |doc| doc.hosts[0].status == Status::Online).await);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert!(!trigger.notify_host_mutated(ip(7)));
}

#[tokio::test]
async fn test_cancellation_stops_inflight_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "a")]).await;

    let prober = ScriptedProber::slow([(ip(1), ProbeOutcome::alive(1))], Duration::from_secs(30));
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober, fast_probe_config());

    let token = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(token.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(store.snapshot().await.hosts[0].status, Status::Unknown);
}

#[tokio::test]
async fn test_worker_panic_fails_cycle_without_merging() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "a")]).await;

    let prober = ScriptedProber::panicking_once([(ip(1), ProbeOutcome::alive(5))]);
    let (scheduler, _trigger) = ProbeScheduler::new(Arc::clone(&store), prober, fast_probe_config());
    let token = CancellationToken::new();

    let failed = scheduler.run_cycle(&token).await;
    assert!(matches!(failed, Err(SweepError::Worker(_))), "{failed:?}");
    assert_eq!(store.snapshot().await.hosts[0].status, Status::Unknown);

    let report = scheduler.run_cycle(&token).await.unwrap();
    assert_eq!(report.cycle, 2);
    assert_eq!(report.online, 1);
}

#[tokio::test]
async fn test_sweep_loop_recovers_after_failure_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    seed(&store, vec![Host::new(ip(1), "a")]).await;

    let config = ProbeConfig {
        failure_cooldown_secs: 1,
        ..fast_probe_config()
    };
    let prober = ScriptedProber::panicking_once([(ip(1), ProbeOutcome::alive(5))]);
    let (scheduler, trigger) = ProbeScheduler::new(Arc::clone(&store), prober.clone(), config);

    let token = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(token.clone()));

    assert!(eventually(&store, |doc| doc.hosts[0].latency_ms == Some(5)).await);
    assert!(prober.calls().len() >= 2);

    // The trigger loop survived the failed sweep too.
    assert!(trigger.notify_host_mutated(ip(1)));

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disabled_scheduler_returns_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _notifier) = open_store(dir.path()).await;
    let config = ProbeConfig {
        enabled: false,
        ..fast_probe_config()
    };
    let prober = ScriptedProber::new([]);
    let (scheduler, _trigger) = ProbeScheduler::new(store, prober.clone(), config);

    tokio::time::timeout(Duration::from_secs(1), scheduler.run(CancellationToken::new()))
        .await
        .unwrap();
    assert!(prober.calls().is_empty());
}

#[tokio::test]
async fn test_supervisor_runs_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let config = MonitorConfig {
        store: StoreConfig::at(dir.path().join("topology.json")),
        probe: fast_probe_config(),
        ..MonitorConfig::default()
    };
    let prober = ScriptedProber::new([(ip(1), ProbeOutcome::alive(4))]);

    let supervisor = Supervisor::start(config, prober).await;
    let mut events = supervisor.notifier().subscribe();

    seed(supervisor.store(), vec![Host::new(ip(1), "core")]).await;
    assert!(supervisor.trigger().notify_host_mutated(ip(1)));
    assert!(eventually(supervisor.store(), |doc| doc.hosts[0].latency_ms == Some(4)).await);
    assert!(events.recv().await.is_ok());

    supervisor.shutdown(Duration::from_secs(1)).await;

    let on_disk = std::fs::read(dir.path().join("topology.json")).unwrap();
    let (document, _) = TopologyDocument::from_json(&on_disk).unwrap();
    assert_eq!(document.hosts[0].status, Status::Online);
    assert_eq!(document.hosts[0].latency_ms, Some(4));
}

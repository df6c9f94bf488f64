//! # Event Loop Tests
//!
//! Runs the event loop against a scripted watch and an in-memory cluster,
//! in virtual time.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::*;
use gossip_key_rotator::detector::Fingerprint;
use gossip_key_rotator::keyring::KeyringError;
use gossip_key_rotator::rotation::RotationOutcome;
use gossip_key_rotator::runtime::{resume_baseline, EventLoop, PathWatch, WatchEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Watch fed by the test through a channel
struct ChannelWatch {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    rearms: Arc<AtomicUsize>,
    failing_rearms: Arc<AtomicUsize>,
}

#[async_trait]
impl PathWatch for ChannelWatch {
    async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    fn try_recv(&mut self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }

    async fn rearm(&mut self) -> Result<()> {
        self.rearms.fetch_add(1, Ordering::SeqCst);
        if self.failing_rearms.load(Ordering::SeqCst) > 0 {
            self.failing_rearms.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("path does not exist");
        }
        Ok(())
    }
}

struct Harness {
    events: mpsc::UnboundedSender<WatchEvent>,
    rearms: Arc<AtomicUsize>,
    failing_rearms: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<EventLoop<ChannelWatch>>,
    _dir: tempfile::TempDir,
    dir_path: std::path::PathBuf,
}

const INTERVAL: Duration = Duration::from_secs(60);

fn start(cluster: &Arc<FakeCluster>, committed: &str, current: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let dir_path = dir.path().to_path_buf();
    let detector = detector(&dir_path, committed, current);
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let rearms = Arc::new(AtomicUsize::new(0));
    let failing_rearms = Arc::new(AtomicUsize::new(0));

    let watch = ChannelWatch {
        events: rx,
        rearms: Arc::clone(&rearms),
        failing_rearms: Arc::clone(&failing_rearms),
    };
    let mut event_loop = EventLoop::new(
        watch,
        detector,
        orchestrator(cluster, cancel.clone()),
        INTERVAL,
        cancel.clone(),
    );
    let task = tokio::spawn(async move {
        event_loop.run().await;
        event_loop
    });

    Harness {
        events: tx,
        rearms,
        failing_rearms,
        cancel,
        task,
        _dir: dir,
        dir_path,
    }
}

impl Harness {
    async fn stop(self) -> EventLoop<ChannelWatch> {
        self.cancel.cancel();
        self.task.await.unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_drives_pending_rotation() {
    let cluster = FakeCluster::new(3, KEY_A);
    let harness = start(&cluster, KEY_A, KEY_B);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let event_loop = harness.stop().await;

    assert_eq!(cluster.primary().as_deref(), Some(KEY_B));
    assert_eq!(
        event_loop.detector().committed(),
        Some(&Fingerprint::of(KEY_B))
    );
    assert!(matches!(
        event_loop.last_outcome(),
        Some(RotationOutcome::Done { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_write_event_triggers_detection() {
    let cluster = FakeCluster::new(3, KEY_A);
    let harness = start(&cluster, KEY_A, KEY_A);

    // Let the first tick find nothing
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(cluster.calls().is_empty());

    write_key(&harness.dir_path, KEY_B);
    harness.events.send(WatchEvent::Write).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let event_loop = harness.stop().await;
    assert_eq!(cluster.primary().as_deref(), Some(KEY_B));
    assert!(event_loop.last_outcome().is_some_and(RotationOutcome::is_done));
}

#[tokio::test(start_paused = true)]
async fn test_identical_rewrites_never_rotate() {
    let cluster = FakeCluster::new(3, KEY_B);
    let harness = start(&cluster, KEY_B, KEY_B);

    for _ in 0..5 {
        write_key(&harness.dir_path, KEY_B);
        harness.events.send(WatchEvent::Write).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    tokio::time::sleep(INTERVAL * 3).await;

    let event_loop = harness.stop().await;
    assert!(cluster.calls().is_empty());
    assert!(event_loop.last_outcome().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_remove_event_rearms_watch() {
    let cluster = FakeCluster::new(3, KEY_A);
    let harness = start(&cluster, KEY_A, KEY_A);
    tokio::time::sleep(Duration::from_secs(1)).await;

    harness.events.send(WatchEvent::Remove).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(harness.rearms.load(Ordering::SeqCst), 1);
    harness.stop().await;
    assert!(cluster.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_rearm_retried_on_timer() {
    let cluster = FakeCluster::new(3, KEY_A);
    let harness = start(&cluster, KEY_A, KEY_A);
    harness.failing_rearms.store(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1)).await;

    harness.events.send(WatchEvent::Remove).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.rearms.load(Ordering::SeqCst), 1);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(harness.rearms.load(Ordering::SeqCst), 2);

    // Re-armed now; later ticks leave the watch alone
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(harness.rearms.load(Ordering::SeqCst), 2);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_ticks_never_mutate() {
    let cluster = FakeCluster::new(3, KEY_A);
    cluster.set_leader(Err(KeyringError::Timeout(Duration::from_secs(5))));
    let harness = start(&cluster, KEY_A, KEY_B);

    tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(1)).await;
    let event_loop = harness.stop().await;

    assert!(cluster.mutations().is_empty());
    assert!(cluster.count(|c| *c == Call::Leader) >= 3);
    assert_eq!(
        event_loop.detector().committed(),
        Some(&Fingerprint::of(KEY_A))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_rotation_retried_on_next_tick() {
    let cluster = FakeCluster::new(3, KEY_A);
    cluster.set_propagation(Propagation::Never);
    let harness = start(&cluster, KEY_A, KEY_B);

    // First tick fails after the propagation budget
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(cluster.count(|c| matches!(c, Call::Install(_))), 1);
    assert_eq!(cluster.primary().as_deref(), Some(KEY_A));

    cluster.set_propagation(Propagation::Immediate);
    cluster.preinstall(KEY_B);
    tokio::time::sleep(INTERVAL).await;

    let event_loop = harness.stop().await;
    assert_eq!(cluster.count(|c| matches!(c, Call::Install(_))), 2);
    assert_eq!(cluster.primary().as_deref(), Some(KEY_B));
    assert_eq!(
        event_loop.detector().committed(),
        Some(&Fingerprint::of(KEY_B))
    );
}

#[tokio::test(start_paused = true)]
async fn test_events_during_rotation_are_coalesced() {
    let cluster = FakeCluster::new(3, KEY_A);
    cluster.set_propagation(Propagation::AfterPolls(3));
    let harness = start(&cluster, KEY_A, KEY_B);

    // Queue several events while the first rotation polls
    tokio::time::sleep(Duration::from_millis(500)).await;
    for _ in 0..4 {
        harness.events.send(WatchEvent::Write).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(20)).await;

    harness.stop().await;
    assert_eq!(cluster.count(|c| matches!(c, Call::Install(_))), 1);
    assert_eq!(cluster.count(|c| matches!(c, Call::Promote(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_loop() {
    let cluster = FakeCluster::new(3, KEY_A);
    let harness = start(&cluster, KEY_A, KEY_A);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(1), harness.stop()).await;
    assert!(stopped.is_ok());
}

#[tokio::test]
async fn test_resume_resets_baseline_when_cluster_lags() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = FakeCluster::new(3, KEY_A);
    cluster.preinstall(KEY_B);
    let (mut detector, material) =
        gossip_key_rotator::detector::ChangeDetector::initialize(write_key(dir.path(), KEY_B))
            .unwrap();

    resume_baseline(&mut detector, &material, cluster.as_ref(), Duration::from_secs(1)).await;

    assert!(detector.committed().is_none());
}

#[tokio::test]
async fn test_resume_keeps_baseline_when_cluster_matches() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = FakeCluster::new(3, KEY_B);
    let (mut detector, material) =
        gossip_key_rotator::detector::ChangeDetector::initialize(write_key(dir.path(), KEY_B))
            .unwrap();

    resume_baseline(&mut detector, &material, cluster.as_ref(), Duration::from_secs(1)).await;

    assert_eq!(detector.committed(), Some(&Fingerprint::of(KEY_B)));
}

#[tokio::test]
async fn test_resume_keeps_baseline_when_listing_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = FakeCluster::new(3, KEY_A);
    cluster.fail_lists(vec![KeyringError::Connection("refused".to_string())]);
    let (mut detector, material) =
        gossip_key_rotator::detector::ChangeDetector::initialize(write_key(dir.path(), KEY_B))
            .unwrap();

    resume_baseline(&mut detector, &material, cluster.as_ref(), Duration::from_secs(1)).await;

    assert_eq!(detector.committed(), Some(&Fingerprint::of(KEY_B)));
}

//! Background scheduler behaviour.

use serde_json::json;
use std::time::Duration;
use syncq_engine::{Action, SubmitOptions, SyncError};
use syncq_testkit::{fields, test_config, CallKind, TestEngine};

async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..300 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn submit(h: &TestEngine, id: &str) {
    h.submit(
        "todos",
        Action::Insert,
        fields(json!({"id": id})),
        SubmitOptions::new(),
    )
    .unwrap();
}

#[test]
fn start_requires_a_runtime() {
    let h = TestEngine::memory();
    assert!(matches!(h.start(), Err(SyncError::NoRuntime)));
    assert!(!h.is_running());
}

#[tokio::test]
async fn start_is_idempotent() {
    let h = TestEngine::memory();
    assert!(h.start().unwrap());
    assert!(!h.start().unwrap());
    assert!(h.is_running());

    h.stop().await;
    assert!(!h.is_running());
}

#[tokio::test]
async fn submission_wakes_scheduler() {
    let h = TestEngine::memory_with(test_config().with_sync_on_submit(true));
    h.start().unwrap();

    submit(&h, "1");
    assert!(eventually(|| h.remote.calls(CallKind::Insert) == 1).await);
    assert!(eventually(|| h.stats().pending_operations == 0).await);

    h.stop().await;
}

#[tokio::test]
async fn interval_drives_passes() {
    let h = TestEngine::memory_with(test_config().with_sync_interval(Duration::from_millis(20)));
    submit(&h, "1");
    h.start().unwrap();

    assert!(eventually(|| h.stats().total_synced == 1).await);
    assert!(eventually(|| h.events.passes() >= 2).await);

    h.stop().await;
}

#[tokio::test]
async fn reconnect_triggers_pass() {
    let h = TestEngine::memory();
    h.go_online(false);
    h.start().unwrap();
    submit(&h, "1");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.remote.calls(CallKind::Insert), 0);

    h.go_online(true);
    assert!(eventually(|| h.stats().total_synced == 1).await);

    h.stop().await;
}

#[tokio::test]
async fn interval_tick_reads_the_probe() {
    let h = TestEngine::memory_with(test_config().with_sync_interval(Duration::from_millis(20)));
    h.probe.set(false);
    submit(&h, "1");
    h.start().unwrap();

    assert!(eventually(|| !h.is_online()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.calls(CallKind::Insert), 0);
    assert_eq!(h.events.passes(), 0);

    h.probe.set(true);
    assert!(eventually(|| h.stats().total_synced == 1).await);

    h.stop().await;
}

#[tokio::test]
async fn stopped_scheduler_stays_quiet() {
    let h = TestEngine::memory_with(test_config().with_sync_on_submit(true));
    h.start().unwrap();
    h.stop().await;

    submit(&h, "1");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.remote.calls(CallKind::Insert), 0);
    assert_eq!(h.stats().pending_operations, 1);
}

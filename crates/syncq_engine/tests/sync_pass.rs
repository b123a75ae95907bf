//! Sync pass behaviour against an instrumented remote.

use serde_json::json;
use std::time::Duration;
use syncq_engine::{
    Action, EngineState, OperationState, Priority, RemoteError, RetryConfig, SubmitOptions,
    SyncError, SyncEvent,
};
use syncq_testkit::{fields, test_config, CallKind, TestEngine};

fn insert(h: &TestEngine, id: &str, priority: Priority) -> syncq_engine::OperationId {
    h.submit(
        "todos",
        Action::Insert,
        fields(json!({"id": id, "title": id})),
        SubmitOptions::new().with_priority(priority),
    )
    .unwrap()
}

fn inserted_ids(h: &TestEngine) -> Vec<String> {
    h.remote
        .log()
        .into_iter()
        .filter(|call| call.kind == CallKind::Insert)
        .filter_map(|call| call.payload?.get("id")?.as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn dispatches_in_priority_order() {
    let h = TestEngine::memory();
    insert(&h, "low", Priority::Low);
    insert(&h, "critical", Priority::Critical);
    insert(&h, "normal-1", Priority::Normal);
    insert(&h, "normal-2", Priority::Normal);
    insert(&h, "high", Priority::High);

    let report = h.force_sync().await.unwrap();

    assert_eq!(report.synced, 5);
    assert!(report.is_clean());
    assert_eq!(
        inserted_ids(&h),
        vec!["critical", "high", "normal-1", "normal-2", "low"]
    );
    assert_eq!(h.stats().pending_operations, 0);
    assert_eq!(h.stats().total_synced, 5);
    assert_eq!(h.remote.store().rows("todos").len(), 5);
}

#[tokio::test]
async fn one_operation_in_flight_at_a_time() {
    let h = TestEngine::memory();
    for i in 0..8 {
        insert(&h, &format!("row-{i}"), Priority::Normal);
    }

    h.force_sync().await.unwrap();
    assert_eq!(h.remote.calls(CallKind::Insert), 8);
    assert_eq!(h.remote.max_concurrency(), 1);
}

#[tokio::test]
async fn second_pass_is_refused_while_one_runs() {
    let h = TestEngine::memory();
    let id = insert(&h, "gated", Priority::Normal);
    h.remote.close_gate();

    let (first, second) = tokio::join!(h.force_sync(), async {
        while h.remote.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(h.state(), EngineState::OnlineSyncing);
        assert_eq!(h.operation_state(&id), Some(OperationState::Syncing));
        let second = h.force_sync().await;
        h.remote.open_gate();
        second
    });

    assert!(matches!(second, Err(SyncError::SyncInProgress)));
    assert_eq!(first.unwrap().synced, 1);
    assert_eq!(h.remote.calls(CallKind::Insert), 1);
    assert_eq!(h.state(), EngineState::OnlineIdle);
}

#[tokio::test]
async fn transient_failures_stop_at_retry_cap() {
    let h = TestEngine::memory();
    let id = insert(&h, "doomed", Priority::Normal);
    h.remote.fail_always(Some(RemoteError::transient("connection reset")));

    for _ in 0..5 {
        h.force_sync().await.unwrap();
    }

    assert_eq!(h.remote.calls(CallKind::Insert), 3);
    let stats = h.stats();
    assert_eq!(stats.failed_operations, 1);
    assert_eq!(stats.pending_operations, 0);
    assert_eq!(h.operation_state(&id), None);

    let retried = h.events.count(|e| {
        matches!(e, SyncEvent::OperationFailed { will_retry: true, .. })
    });
    let dropped = h.events.count(|e| {
        matches!(e, SyncEvent::OperationFailed { will_retry: false, retry_count: 3, .. })
    });
    assert_eq!((retried, dropped), (2, 1));
}

#[tokio::test]
async fn per_operation_retry_budget() {
    let h = TestEngine::memory();
    h.submit(
        "todos",
        Action::Insert,
        fields(json!({"id": "once"})),
        SubmitOptions::new().with_max_retries(1),
    )
    .unwrap();
    h.remote.fail_always(Some(RemoteError::transient("down")));

    h.force_sync().await.unwrap();
    h.force_sync().await.unwrap();
    assert_eq!(h.remote.calls(CallKind::Insert), 1);
    assert_eq!(h.stats().failed_operations, 1);
}

#[tokio::test]
async fn permanent_failure_drops_immediately() {
    let h = TestEngine::memory();
    insert(&h, "bad", Priority::Normal);
    h.remote.fail_next(RemoteError::permanent("violates check constraint"));

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(h.remote.calls(CallKind::Insert), 1);
    assert_eq!(h.stats().failed_operations, 1);
}

#[tokio::test]
async fn permanent_failure_can_spend_the_budget() {
    let config = test_config()
        .with_retry(RetryConfig::without_backoff().with_fail_fast_permanent(false));
    let h = TestEngine::memory_with(config);
    insert(&h, "bad", Priority::Normal);
    h.remote.fail_always(Some(RemoteError::permanent("rejected")));

    for _ in 0..4 {
        h.force_sync().await.unwrap();
    }
    assert_eq!(h.remote.calls(CallKind::Insert), 3);
}

#[tokio::test]
async fn failed_operation_backs_off() {
    let config = test_config().with_retry(
        RetryConfig::new()
            .with_initial_delay(Duration::from_millis(150))
            .with_jitter(false),
    );
    let h = TestEngine::memory_with(config);
    insert(&h, "flaky", Priority::Normal);
    h.remote.fail_next(RemoteError::transient("timeout"));

    h.force_sync().await.unwrap();
    h.force_sync().await.unwrap();
    assert_eq!(h.remote.calls(CallKind::Insert), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let report = h.force_sync().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(h.remote.calls(CallKind::Insert), 2);
}

#[tokio::test]
async fn failure_does_not_block_later_operations() {
    let h = TestEngine::memory();
    insert(&h, "first", Priority::High);
    insert(&h, "second", Priority::Normal);
    h.remote
        .fail_next_of(CallKind::Insert, RemoteError::transient("blip"));

    let report = h.force_sync().await.unwrap();
    assert_eq!((report.synced, report.retrying), (1, 1));
    assert!(h.remote.store().row("todos", "second").is_some());
}

#[tokio::test]
async fn dependent_waits_for_its_dependency() {
    let h = TestEngine::memory();
    let parent = insert(&h, "parent", Priority::Low);
    h.submit(
        "todos",
        Action::Insert,
        fields(json!({"id": "child"})),
        SubmitOptions::new()
            .with_priority(Priority::Critical)
            .depends_on(parent),
    )
    .unwrap();
    h.remote
        .fail_next_of(CallKind::Insert, RemoteError::transient("blip"));

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(inserted_ids(&h), vec!["parent"]);

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(inserted_ids(&h), vec!["parent", "parent", "child"]);
}

#[tokio::test]
async fn unknown_dependency_is_resolved() {
    let h = TestEngine::memory();
    h.submit(
        "todos",
        Action::Insert,
        fields(json!({"id": "orphan"})),
        SubmitOptions::new().depends_on(syncq_engine::OperationId::new()),
    )
    .unwrap();

    assert_eq!(h.force_sync().await.unwrap().synced, 1);
}

#[tokio::test]
async fn slow_call_times_out_as_transient_failure() {
    let config = test_config().with_request_timeout(Duration::from_millis(50));
    let h = TestEngine::memory_with(config);
    insert(&h, "slow", Priority::Normal);
    h.remote.set_latency(Duration::from_millis(300));

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.retrying, 1);
    let error = report.outcomes[0].error.clone().unwrap();
    assert!(error.contains("timed out"), "{error}");
}

#[tokio::test]
async fn timed_out_call_finishes_before_the_next_dispatch() {
    let config = test_config().with_request_timeout(Duration::from_millis(50));
    let h = TestEngine::memory_with(config);
    for i in 0..3 {
        insert(&h, &format!("row-{i}"), Priority::Normal);
    }
    h.remote.set_latency(Duration::from_millis(300));

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.retrying, 3);
    assert_eq!(h.remote.max_concurrency(), 1);
    assert_eq!(h.remote.in_flight(), 0);
    assert_eq!(h.remote.store().rows("todos").len(), 3);

    h.remote.set_latency(Duration::ZERO);
    let report = h.force_sync().await.unwrap();
    assert_eq!(report.synced, 3);
    assert_eq!(h.remote.calls(CallKind::Insert), 3);
    assert_eq!(h.remote.calls(CallKind::Fetch), 3);
    assert_eq!(h.remote.max_concurrency(), 1);

    let stats = h.stats();
    assert_eq!(stats.failed_operations, 0);
    assert_eq!(stats.pending_operations, 0);
}

#[tokio::test]
async fn retried_insert_without_a_landed_row_is_sent_again() {
    let h = TestEngine::memory();
    insert(&h, "retry", Priority::Normal);
    h.remote
        .fail_next_of(CallKind::Insert, RemoteError::transient("blip"));

    assert_eq!(h.force_sync().await.unwrap().retrying, 1);
    assert_eq!(h.force_sync().await.unwrap().synced, 1);
    assert_eq!(h.remote.calls(CallKind::Insert), 2);
    assert_eq!(h.remote.calls(CallKind::Fetch), 1);
    assert!(h.remote.store().row("todos", "retry").is_some());
}

#[tokio::test]
async fn submissions_during_a_pass_wait_for_the_next_one() {
    let h = TestEngine::memory();
    insert(&h, "early", Priority::Low);
    h.remote.close_gate();

    let (report, late) = tokio::join!(h.force_sync(), async {
        while h.remote.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let late = insert(&h, "late", Priority::Critical);
        h.remote.open_gate();
        late
    });

    let report = report.unwrap();
    assert_eq!((report.attempted, report.synced), (1, 1));
    assert_eq!(inserted_ids(&h), vec!["early"]);
    assert_eq!(h.operation_state(&late), Some(OperationState::Pending));

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(inserted_ids(&h), vec!["early", "late"]);
}

#[tokio::test]
async fn forced_pass_runs_while_offline() {
    let h = TestEngine::memory();
    insert(&h, "offline", Priority::Normal);
    h.go_online(false);
    assert_eq!(h.state(), EngineState::Offline);

    let report = h.force_sync().await.unwrap();
    assert_eq!(report.synced, 1);
    assert!(!h.stats().is_online);
}

#[tokio::test]
async fn pass_updates_timing_stats() {
    let h = TestEngine::memory();
    assert_eq!(h.stats().last_sync_time, None);

    h.force_sync().await.unwrap();
    let stats = h.stats();
    assert!(stats.last_sync_time.is_some());
    assert_eq!(h.events.passes(), 1);
}

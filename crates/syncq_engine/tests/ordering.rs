//! Property tests for queue ordering.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use syncq_engine::{Action, Fields, Operation, OperationQueue, SubmitOptions};
use syncq_storage::InMemoryStore;
use syncq_testkit::submission_batch_strategy;

fn queue() -> OperationQueue {
    OperationQueue::open(
        Arc::new(InMemoryStore::new()),
        usize::MAX,
        Duration::from_secs(3600),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn sorted_for_sync_is_priority_then_age(batch in submission_batch_strategy()) {
        let queue = queue();
        for (priority, created_at) in batch {
            let mut op = Operation::new(
                "items",
                Action::Insert,
                Fields::new(),
                SubmitOptions::new().with_priority(priority),
                "id",
                3,
            )
            .unwrap();
            op.created_at = created_at;
            queue.add(op).unwrap();
        }

        let sorted = queue.sorted_for_sync(i64::MAX);
        prop_assert_eq!(sorted.len(), queue.len());
        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.priority >= b.priority);
            if a.priority == b.priority {
                prop_assert!(a.created_at <= b.created_at);
                if a.created_at == b.created_at {
                    prop_assert!(a.sequence < b.sequence);
                }
            }
        }
    }

    #[test]
    fn next_for_sync_walks_the_sorted_order(batch in submission_batch_strategy()) {
        let queue = queue();
        for (priority, created_at) in batch {
            let mut op = Operation::new(
                "items",
                Action::Insert,
                Fields::new(),
                SubmitOptions::new().with_priority(priority),
                "id",
                3,
            )
            .unwrap();
            op.created_at = created_at;
            queue.add(op).unwrap();
        }

        let sorted: Vec<_> = queue.sorted_for_sync(i64::MAX).into_iter().map(|op| op.id).collect();
        let mut candidates = queue.snapshot_for_pass();
        let mut walked = Vec::new();
        while let Some(op) = queue.next_for_sync(i64::MAX, &candidates) {
            candidates.remove(&op.id);
            walked.push(op.id);
        }
        prop_assert_eq!(walked, sorted);
    }
}

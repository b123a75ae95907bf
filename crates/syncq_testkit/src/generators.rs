//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::Value;
use syncq_protocol::{Fields, Priority};

/// Strategy for generating priorities.
pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

/// Strategy for generating table names.
pub fn table_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating flat payloads without an `id` field.
pub fn payload_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
            Just(Value::Null),
        ],
        0..6,
    )
    .prop_map(|map| {
        map.into_iter()
            .filter(|(key, _)| key != "id")
            .collect::<Fields>()
    })
}

/// Strategy for batches of `(priority, created_at)` submissions with
/// deliberately colliding timestamps.
pub fn submission_batch_strategy() -> impl Strategy<Value = Vec<(Priority, i64)>> {
    prop::collection::vec((priority_strategy(), 0i64..8), 1..40)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn payloads_never_carry_an_id(payload in payload_strategy()) {
            prop_assert!(!payload.contains_key("id"));
        }

        #[test]
        fn tables_are_valid(table in table_strategy()) {
            prop_assert!(!table.is_empty());
        }
    }
}

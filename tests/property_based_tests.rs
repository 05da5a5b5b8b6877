//! Property-based tests for the pending-call registry and webhook ordering.

use proptest::prelude::*;
use std::{collections::HashMap, sync::Arc, thread};

use forward_amd::{
    calls::{AnsweredBy, CallSid, CallStatus, CorrelationKey},
    orchestrator::LegOutcome,
    registry::{PendingCallRegistry, RegistryError},
};

#[derive(Debug, Clone)]
enum Op {
    Register(u8, u8),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 0u8..50).prop_map(|(k, v)| Op::Register(k, v)),
        (0u8..6).prop_map(Op::Remove),
    ]
}

fn key(k: u8) -> CorrelationKey {
    CorrelationKey::from(&CallSid::new(format!("CA{k}")).unwrap())
}

fn outbound(v: u8) -> CallSid {
    CallSid::new(format!("CB{v}")).unwrap()
}

fn status_strategy() -> impl Strategy<Value = CallStatus> {
    prop::sample::select(vec![
        CallStatus::Queued,
        CallStatus::Ringing,
        CallStatus::InProgress,
        CallStatus::Completed,
        CallStatus::Busy,
        CallStatus::Failed,
        CallStatus::NoAnswer,
        CallStatus::Canceled,
    ])
}

fn answered_by_strategy() -> impl Strategy<Value = Option<AnsweredBy>> {
    prop::option::of(prop::sample::select(vec![
        AnsweredBy::Human,
        AnsweredBy::Machine,
        AnsweredBy::Fax,
        AnsweredBy::Unknown,
    ]))
}

proptest! {
    /// The registry behaves like a map that refuses overwrites and whose
    /// removals are idempotent.
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let registry = PendingCallRegistry::new();
        let mut model: HashMap<u8, u8> = HashMap::new();

        for op in ops {
            match op {
                Op::Register(k, v) => {
                    let result = registry.register(key(k), outbound(v));
                    if let std::collections::hash_map::Entry::Vacant(slot) = model.entry(k) {
                        slot.insert(v);
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert_eq!(result, Err(RegistryError::DuplicateKey(key(k))));
                    }
                }
                Op::Remove(k) => {
                    let expected = model.remove(&k).map(outbound);
                    prop_assert_eq!(registry.try_remove(&key(k)), expected);
                    prop_assert_eq!(registry.try_remove(&key(k)), None);
                }
            }
            prop_assert_eq!(registry.len(), model.len());
        }
    }

    /// However many deliveries race on one key, exactly one gets the call.
    #[test]
    fn racing_removals_have_one_winner(threads in 2usize..8) {
        let registry = Arc::new(PendingCallRegistry::new());
        registry.register(key(1), outbound(1)).unwrap();

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.try_remove(&key(1)))
            })
            .collect();
        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();

        prop_assert_eq!(winners, 1);
        prop_assert!(registry.is_empty());
    }

    /// Automated answers are never classified as something to join.
    #[test]
    fn machines_are_never_joined(status in status_strategy(), answered_by in answered_by_strategy()) {
        let outcome = LegOutcome::classify(status, answered_by);
        if answered_by.is_some_and(|a| a.is_automated()) {
            prop_assert_ne!(outcome, LegOutcome::Answered);
        }
        if status.is_progress() {
            prop_assert_eq!(outcome, LegOutcome::Progress);
        }
    }
}

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, trace};

use crate::calls::{CallSid, CorrelationKey};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("An outbound call is already pending for {0}")]
    DuplicateKey(CorrelationKey),
}

/// In-flight outbound calls keyed by the side that is parked waiting for them.
///
/// Every mutation is a single shard-locked map operation, so two webhooks
/// racing on the same key see exactly one successful removal. Nothing here
/// awaits, which keeps provider I/O outside the lock.
#[derive(Debug, Default)]
pub struct PendingCallRegistry {
    pending: DashMap<CorrelationKey, CallSid>,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: CorrelationKey, outbound: CallSid) -> Result<(), RegistryError> {
        match self.pending.entry(key) {
            Entry::Occupied(existing) => {
                debug!(
                    key = %existing.key(),
                    pending = %existing.get(),
                    rejected = %outbound,
                    "Refusing second pending outbound call"
                );
                Err(RegistryError::DuplicateKey(existing.key().clone()))
            }
            Entry::Vacant(slot) => {
                trace!(key = %slot.key(), outbound = %outbound, "Registered pending outbound call");
                slot.insert(outbound);
                Ok(())
            }
        }
    }

    /// Remove and return the pending call for `key`. Absent keys are not an error.
    pub fn try_remove(&self, key: &CorrelationKey) -> Option<CallSid> {
        let removed = self.pending.remove(key).map(|(_, outbound)| outbound);
        trace!(key = %key, removed = removed.is_some(), "Pending outbound removal");
        removed
    }

    /// Remove the entry for `key` only while it still points at `outbound`.
    /// A callback from any other leg leaves the pending call in place.
    pub fn try_remove_if(&self, key: &CorrelationKey, outbound: &CallSid) -> Option<CallSid> {
        let removed = self
            .pending
            .remove_if(key, |_, pending| pending == outbound)
            .map(|(_, outbound)| outbound);
        trace!(key = %key, outbound = %outbound, removed = removed.is_some(), "Matching pending outbound removal");
        removed
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::TaskSid;
    use std::sync::Arc;

    fn key(id: &str) -> CorrelationKey {
        CorrelationKey::from(&CallSid::new(id).unwrap())
    }

    fn sid(id: &str) -> CallSid {
        CallSid::new(id).unwrap()
    }

    #[test]
    fn register_then_remove_once() {
        let registry = PendingCallRegistry::new();
        registry.register(key("CA1"), sid("CA2")).unwrap();

        assert!(registry.contains(&key("CA1")));
        assert_eq!(registry.try_remove(&key("CA1")), Some(sid("CA2")));
        assert_eq!(registry.try_remove(&key("CA1")), None);
        assert!(!registry.contains(&key("CA1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn conditional_removal_needs_the_pending_call() {
        let registry = PendingCallRegistry::new();
        registry.register(key("CA1"), sid("CA2")).unwrap();

        assert_eq!(registry.try_remove_if(&key("CA1"), &sid("CA3")), None);
        assert!(registry.contains(&key("CA1")));
        assert_eq!(registry.try_remove_if(&key("CA1"), &sid("CA2")), Some(sid("CA2")));
        assert_eq!(registry.try_remove_if(&key("CA1"), &sid("CA2")), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_key_is_rejected_and_keeps_first_entry() {
        let registry = PendingCallRegistry::new();
        registry.register(key("CA1"), sid("CA2")).unwrap();

        let err = registry.register(key("CA1"), sid("CA3")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey(key("CA1")));
        assert_eq!(registry.try_remove(&key("CA1")), Some(sid("CA2")));
    }

    #[test]
    fn task_and_call_keys_share_one_namespace() {
        let registry = PendingCallRegistry::new();
        let task = TaskSid::new("WT1").unwrap();
        registry
            .register(CorrelationKey::from(&task), sid("CA9"))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.try_remove(&CorrelationKey::from(&task)),
            Some(sid("CA9"))
        );
    }

    #[test]
    fn racing_removals_have_a_single_winner() {
        for round in 0..50 {
            let registry = Arc::new(PendingCallRegistry::new());
            let k = key(&format!("CA{round}"));
            registry.register(k.clone(), sid("CA-out")).unwrap();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let k = k.clone();
                    std::thread::spawn(move || registry.try_remove(&k))
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(Option::is_some)
                .count();
            assert_eq!(winners, 1);
        }
    }
}

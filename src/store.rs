// 🗄️ Policy Store Adapter - read-only access to existing policies
// The resolver's only data source. No caching happens on this side of the boundary.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::error::LookupError;
use crate::policy::{PolicyRecord, PolicyTypeTag, UserId};

/// Lists a user's policies of one type.
///
/// Implementations must be Send + Sync so lookups can be issued concurrently.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn list_policies(
        &self,
        user: &UserId,
        policy_type: PolicyTypeTag,
    ) -> Result<Vec<PolicyRecord>, LookupError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory adapter for tests, demos and embedding.
///
/// Lookups for a type marked as failing return `LookupError`.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    records: RwLock<Vec<PolicyRecord>>,
    failing: RwLock<HashSet<PolicyTypeTag>>,
    calls: AtomicUsize,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PolicyRecord>) -> Self {
        InMemoryPolicyStore {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Add a record (store-side write, never done by the resolver)
    pub fn insert(&self, record: PolicyRecord) {
        write_recovering(&self.records, "records").push(record);
    }

    /// Make every lookup of `policy_type` fail
    pub fn fail_type(&self, policy_type: PolicyTypeTag) {
        write_recovering(&self.failing, "failure set").insert(policy_type);
    }

    pub fn fail_all(&self) {
        for tag in PolicyTypeTag::ALL {
            self.fail_type(tag);
        }
    }

    pub fn heal_all(&self) {
        write_recovering(&self.failing, "failure set").clear();
    }

    /// Number of `list_policies` calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn list_policies(
        &self,
        user: &UserId,
        policy_type: PolicyTypeTag,
    ) -> Result<Vec<PolicyRecord>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if read_recovering(&self.failing, "failure set").contains(&policy_type) {
            return Err(LookupError::new(policy_type, "store unavailable"));
        }

        let records = read_recovering(&self.records, "records");

        Ok(records
            .iter()
            .filter(|r| r.policy_type == policy_type && &r.owner == user)
            .cloned()
            .collect())
    }
}

// Updates are single push/insert/clear calls, so a poisoned lock still guards whole data.
fn read_recovering<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(lock = what, "in-memory store lock poisoned; recovering");
        poisoned.into_inner()
    })
}

fn write_recovering<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(lock = what, "in-memory store lock poisoned; recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, owner: &str, policy_type: PolicyTypeTag, number: &str) -> PolicyRecord {
        PolicyRecord {
            id: id.to_string(),
            owner: UserId::from(owner),
            policy_type,
            policy_number: number.to_string(),
            insurer_name: None,
        }
    }

    #[tokio::test]
    async fn test_lists_only_user_and_type() {
        let store = InMemoryPolicyStore::with_records(vec![
            record("1", "u1", PolicyTypeTag::Health, "H-001"),
            record("2", "u1", PolicyTypeTag::Life, "L-001"),
            record("3", "u2", PolicyTypeTag::Health, "H-002"),
        ]);

        let found = store
            .list_policies(&UserId::from("u1"), PolicyTypeTag::Health)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "1");
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_type() {
        let store = InMemoryPolicyStore::new();
        store.fail_type(PolicyTypeTag::Home);

        let err = store
            .list_policies(&UserId::from("u1"), PolicyTypeTag::Home)
            .await
            .unwrap_err();
        assert_eq!(err.policy_type, PolicyTypeTag::Home);

        assert!(store
            .list_policies(&UserId::from("u1"), PolicyTypeTag::Life)
            .await
            .is_ok());

        store.heal_all();
        assert!(store
            .list_policies(&UserId::from("u1"), PolicyTypeTag::Home)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_writes_survive_poisoned_lock() {
        let store = std::sync::Arc::new(InMemoryPolicyStore::new());

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _records = poisoner.records.write().unwrap();
            let _failing = poisoner.failing.write().unwrap();
            panic!("writer died holding the locks");
        })
        .join();
        assert!(store.records.is_poisoned());
        assert!(store.failing.is_poisoned());

        store.insert(record("1", "u1", PolicyTypeTag::Travel, "TR-1"));
        let found = store
            .list_policies(&UserId::from("u1"), PolicyTypeTag::Travel)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        store.fail_type(PolicyTypeTag::Travel);
        assert!(store
            .list_policies(&UserId::from("u1"), PolicyTypeTag::Travel)
            .await
            .is_err());
    }
}

// 🔍 Duplicate Resolver - Cross-type duplicate policy detection
// Fans out one lookup per policy type, compares canonical policy numbers,
// returns the first match under the fixed type order.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CheckError;
use crate::normalize::NormalizedPolicyNumber;
use crate::policy::{DuplicateMatch, PolicyRecord, PolicyTypeTag, UserId};
use crate::store::PolicyStore;

pub struct DuplicateResolver {
    store: Arc<dyn PolicyStore>,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        DuplicateResolver { store }
    }

    /// Find an existing policy of `user` whose number canonically equals `raw_policy_number`.
    ///
    /// Fails with `InvalidInput` when the input is too short to check, and with
    /// `Lookup` when a store call fails before any match is found.
    pub async fn resolve(
        &self,
        user: &UserId,
        raw_policy_number: &str,
    ) -> Result<Option<DuplicateMatch>, CheckError> {
        let query = NormalizedPolicyNumber::parse(raw_policy_number)?;
        self.resolve_normalized(user, &query).await
    }

    /// Same as `resolve` for an already normalized query.
    ///
    /// All type lookups are issued together and joined. Results are then read
    /// in the fixed type order, so the outcome is the same as a sequential scan:
    /// a match in an earlier type wins, and a failure in an earlier type is
    /// reported even if a later type would have matched.
    pub async fn resolve_normalized(
        &self,
        user: &UserId,
        query: &NormalizedPolicyNumber,
    ) -> Result<Option<DuplicateMatch>, CheckError> {
        debug!(user = %user, query = %query, "resolving duplicate policy number");

        let lookups = PolicyTypeTag::ALL.into_iter().map(|policy_type| async move {
            let result = self.store.list_policies(user, policy_type).await;
            (policy_type, result)
        });
        let results = join_all(lookups).await;

        for (policy_type, result) in results {
            let records = result?;

            if let Some(found) = first_match(user, policy_type, query, &records) {
                debug!(
                    user = %user,
                    policy_type = %policy_type,
                    policy_id = %found.policy_id,
                    "duplicate policy found"
                );
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

/// First record of `user` whose number canonically equals `query`.
fn first_match(
    user: &UserId,
    policy_type: PolicyTypeTag,
    query: &NormalizedPolicyNumber,
    records: &[PolicyRecord],
) -> Option<DuplicateMatch> {
    records
        .iter()
        .filter(|record| {
            if &record.owner != user {
                warn!(
                    user = %user,
                    owner = %record.owner,
                    policy_type = %policy_type,
                    policy_id = %record.id,
                    "store returned a record owned by another user; ignoring it"
                );
                return false;
            }
            true
        })
        .find(|record| query.matches(&record.policy_number))
        .map(|record| DuplicateMatch::from_record(policy_type, record))
}

// ============================================================================
// TESTS
// ============================================================================

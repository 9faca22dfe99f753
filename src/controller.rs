// 🚦 Duplicate-Check Controller - keystrokes in, CheckState out
//
// State machine:
//   idle --submit(valid)--> checking --settle--> resolved(match | none)
//   resolved --submit--> checking
//   any --reset--> idle
//   idle --submit(too short)--> idle   (no store call)
//
// Only the most recently issued submit may settle. Older tickets are discarded.
// Timers and debouncing belong to the caller (see `debounce`).

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::CheckError;
use crate::normalize::NormalizedPolicyNumber;
use crate::policy::{DuplicateMatch, UserId};
use crate::resolver::DuplicateResolver;

// ============================================================================
// CHECK STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckState {
    #[default]
    Idle,
    Checking,
    /// Settled: an existing policy, or none
    Resolved(Option<DuplicateMatch>),
}

impl CheckState {
    pub fn duplicate(&self) -> Option<&DuplicateMatch> {
        match self {
            CheckState::Resolved(Some(found)) => Some(found),
            _ => None,
        }
    }

    pub fn is_checking(&self) -> bool {
        matches!(self, CheckState::Checking)
    }
}

// ============================================================================
// CHECK TICKET
// ============================================================================

/// Handle for one issued check. Carries everything the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTicket {
    generation: u64,
    user: UserId,
    query: NormalizedPolicyNumber,
}

impl CheckTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn query(&self) -> &NormalizedPolicyNumber {
        &self.query
    }

    /// Run this ticket's lookup. The outcome goes back through `settle`.
    pub async fn resolve(
        &self,
        resolver: &DuplicateResolver,
    ) -> Result<Option<DuplicateMatch>, CheckError> {
        resolver.resolve_normalized(&self.user, &self.query).await
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct DuplicateCheckController {
    user: UserId,
    generation: u64,
    state: watch::Sender<CheckState>,
}

impl DuplicateCheckController {
    pub fn new(user: UserId) -> Self {
        let (state, _) = watch::channel(CheckState::Idle);
        DuplicateCheckController {
            user,
            generation: 0,
            state,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Current state (cloned)
    pub fn state(&self) -> CheckState {
        self.state.borrow().clone()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<CheckState> {
        self.state.subscribe()
    }

    /// Start a new check cycle.
    ///
    /// Returns `None` (state `Idle`) when the input is too short to check.
    /// Either way any in-flight ticket becomes stale.
    pub fn submit(&mut self, raw_policy_number: &str) -> Option<CheckTicket> {
        self.generation += 1;

        let query = match NormalizedPolicyNumber::parse(raw_policy_number) {
            Ok(query) => query,
            Err(_) => {
                self.transition(CheckState::Idle);
                return None;
            }
        };

        debug!(user = %self.user, query = %query, generation = self.generation, "duplicate check submitted");
        self.transition(CheckState::Checking);

        Some(CheckTicket {
            generation: self.generation,
            user: self.user.clone(),
            query,
        })
    }

    /// Is `ticket` the most recently issued one, still awaiting settlement?
    pub fn is_current(&self, ticket: &CheckTicket) -> bool {
        ticket.generation == self.generation && self.state.borrow().is_checking()
    }

    /// Apply a resolver outcome. Returns false if the ticket was stale and
    /// the outcome was discarded.
    ///
    /// Lookup failures are logged and settle to "no duplicate": the check is
    /// advisory and must never block the user.
    pub fn settle(
        &mut self,
        ticket: &CheckTicket,
        outcome: Result<Option<DuplicateMatch>, CheckError>,
    ) -> bool {
        if !self.is_current(ticket) {
            debug!(
                user = %self.user,
                stale_generation = ticket.generation,
                current_generation = self.generation,
                "discarding stale duplicate check result"
            );
            return false;
        }

        let next = match outcome {
            Ok(found) => CheckState::Resolved(found),
            Err(CheckError::Lookup(err)) => {
                warn!(
                    user = %self.user,
                    policy_type = %err.policy_type,
                    reason = %err.reason,
                    "duplicate check failed; allowing submission"
                );
                CheckState::Resolved(None)
            }
            Err(CheckError::InvalidInput { .. }) => CheckState::Idle,
        };

        self.transition(next);
        true
    }

    /// Back to idle. Any in-flight result is discarded when it arrives.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.transition(CheckState::Idle);
    }

    /// Submit, resolve, and settle in one go
    pub async fn check(&mut self, resolver: &DuplicateResolver, raw_policy_number: &str) -> CheckState {
        if let Some(ticket) = self.submit(raw_policy_number) {
            let outcome = ticket.resolve(resolver).await;
            self.settle(&ticket, outcome);
        }
        self.state()
    }

    fn transition(&self, next: CheckState) {
        self.state.send_replace(next);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::policy::{PolicyRecord, PolicyTypeTag};
    use crate::store::{InMemoryPolicyStore, PolicyStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    fn motor_record(owner: &str, number: &str) -> PolicyRecord {
        PolicyRecord {
            id: format!("{}-motor", owner),
            owner: UserId::from(owner),
            policy_type: PolicyTypeTag::MotorPrivate,
            policy_number: number.to_string(),
            insurer_name: Some("Acme General".to_string()),
        }
    }

    fn setup() -> (DuplicateResolver, Arc<InMemoryPolicyStore>) {
        let store = Arc::new(InMemoryPolicyStore::with_records(vec![
            motor_record("u1", "MH12AB1234"),
            motor_record("u1", "KA01XY9999"),
        ]));
        (DuplicateResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (resolver, _) = setup();

        let mut u1 = DuplicateCheckController::new(UserId::from("u1"));
        let state = u1.check(&resolver, "mh12ab1234").await;
        let found = state.duplicate().expect("u1 has this motor policy");
        assert_eq!(found.policy_type, PolicyTypeTag::MotorPrivate);
        assert_eq!(found.policy_number, "MH12AB1234");

        let mut u2 = DuplicateCheckController::new(UserId::from("u2"));
        let state = u2.check(&resolver, "MH12AB1234").await;
        assert_eq!(state, CheckState::Resolved(None));
    }

    #[tokio::test]
    async fn test_short_input_never_calls_store() {
        let (resolver, store) = setup();
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));

        for input in ["", "1", " 1 ", "ab", "a  b"] {
            assert!(controller.submit(input).is_none());
            assert_eq!(controller.state(), CheckState::Idle);

            let state = controller.check(&resolver, input).await;
            assert_eq!(state, CheckState::Idle);
        }

        assert_eq!(store.call_count(), 0);
    }

    #[test]
    fn test_short_input_after_result_returns_to_idle() {
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));

        let ticket = controller.submit("ABC123").unwrap();
        assert_eq!(controller.state(), CheckState::Checking);
        assert!(controller.settle(&ticket, Ok(None)));
        assert_eq!(controller.state(), CheckState::Resolved(None));

        assert!(controller.submit("AB").is_none());
        assert_eq!(controller.state(), CheckState::Idle);
    }

    #[test]
    fn test_stale_result_discarded() {
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));
        let x_match = motor_record("u1", "XXX111");
        let x_found = DuplicateMatch::from_record(PolicyTypeTag::MotorPrivate, &x_match);

        let x = controller.submit("XXX111").unwrap();
        let y = controller.submit("YYY222").unwrap();
        assert!(!controller.is_current(&x));
        assert!(controller.is_current(&y));

        // Y settles first, X arrives late
        assert!(controller.settle(&y, Ok(None)));
        assert!(!controller.settle(&x, Ok(Some(x_found.clone()))));
        assert_eq!(controller.state(), CheckState::Resolved(None));

        // X settling before Y is also ignored
        let x = controller.submit("XXX111").unwrap();
        let y = controller.submit("YYY222").unwrap();
        assert!(!controller.settle(&x, Ok(Some(x_found))));
        assert_eq!(controller.state(), CheckState::Checking);
        assert!(controller.settle(&y, Ok(None)));
        assert_eq!(controller.state(), CheckState::Resolved(None));
    }

    #[test]
    fn test_reset_discards_in_flight() {
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));

        let ticket = controller.submit("ABC123").unwrap();
        controller.reset();
        assert_eq!(controller.state(), CheckState::Idle);

        assert!(!controller.settle(&ticket, Ok(None)));
        assert_eq!(controller.state(), CheckState::Idle);
    }

    #[test]
    fn test_ticket_settles_once() {
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));

        let ticket = controller.submit("ABC123").unwrap();
        assert!(controller.settle(&ticket, Ok(None)));
        assert!(!controller.settle(&ticket, Ok(None)));
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_open() {
        let (resolver, store) = setup();
        store.fail_all();

        let mut controller = DuplicateCheckController::new(UserId::from("u1"));
        let state = controller.check(&resolver, "MH12AB1234").await;
        assert_eq!(state, CheckState::Resolved(None));

        // A fresh submit is the retry path
        store.heal_all();
        let state = controller.check(&resolver, "MH12AB1234").await;
        assert!(state.duplicate().is_some());
    }

    #[test]
    fn test_lookup_error_outcome_settles_to_none() {
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));
        let ticket = controller.submit("ABC123").unwrap();

        let err = LookupError::new(PolicyTypeTag::Home, "connection reset");
        assert!(controller.settle(&ticket, Err(err.into())));
        assert_eq!(controller.state(), CheckState::Resolved(None));
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let (resolver, _) = setup();
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));
        let mut rx = controller.subscribe();

        let ticket = controller.submit("KA01XY9999").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CheckState::Checking);

        let outcome = ticket.resolve(&resolver).await;
        controller.settle(&ticket, outcome);
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.duplicate().map(|m| m.policy_number.as_str()), Some("KA01XY9999"));
    }

    /// Holds the first `held_calls` lookups until the gate opens.
    struct GatedStore {
        inner: InMemoryPolicyStore,
        calls: AtomicUsize,
        held_calls: usize,
        gate: Semaphore,
    }

    #[async_trait]
    impl PolicyStore for GatedStore {
        async fn list_policies(
            &self,
            user: &UserId,
            policy_type: PolicyTypeTag,
        ) -> Result<Vec<PolicyRecord>, LookupError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.held_calls {
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| LookupError::new(policy_type, "gate closed"))?;
            }
            self.inner.list_policies(user, policy_type).await
        }
    }

    #[tokio::test]
    async fn test_late_network_response_does_not_overwrite_newer_input() {
        let store = Arc::new(GatedStore {
            inner: InMemoryPolicyStore::with_records(vec![motor_record("u1", "SLOW-777")]),
            calls: AtomicUsize::new(0),
            held_calls: PolicyTypeTag::ALL.len(),
            gate: Semaphore::new(0),
        });
        let resolver = Arc::new(DuplicateResolver::new(store.clone()));
        let mut controller = DuplicateCheckController::new(UserId::from("u1"));

        // X would find a duplicate, but its lookups are stuck in the network
        let x = controller.submit("slow-777").unwrap();
        let slow = {
            let resolver = resolver.clone();
            let x = x.clone();
            tokio::spawn(async move { x.resolve(&resolver).await })
        };
        while store.calls.load(Ordering::SeqCst) < PolicyTypeTag::ALL.len() {
            tokio::task::yield_now().await;
        }

        // User keeps typing; Y settles first
        let y = controller.submit("slow-7778").unwrap();
        let y_outcome = y.resolve(&resolver).await;
        assert!(controller.settle(&y, y_outcome));
        assert_eq!(controller.state(), CheckState::Resolved(None));

        // X finally arrives with a match and must be discarded
        store.gate.add_permits(PolicyTypeTag::ALL.len());
        let x_outcome = slow.await.unwrap();
        assert!(x_outcome.as_ref().unwrap().is_some());
        assert!(!controller.settle(&x, x_outcome));
        assert_eq!(controller.state(), CheckState::Resolved(None));
    }
}

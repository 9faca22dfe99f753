// Policy Duplicate Detection - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod policy;
pub mod normalize;
pub mod error;
pub mod store;
pub mod db;
pub mod resolver;
pub mod controller;
pub mod debounce;
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use policy::{
    DuplicateMatch, PolicyRecord, PolicyTypeTag, UnknownPolicyType, UserId,
};
pub use normalize::{canonicalize, NormalizedPolicyNumber, MIN_POLICY_NUMBER_LEN};
pub use error::{CheckError, LookupError};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use db::{
    NewPolicy, SqlitePolicyStore,
    load_csv, setup_database, insert_policies,
    get_policies_for_user, get_policy, verify_count,
};
pub use resolver::DuplicateResolver;
pub use controller::{CheckState, CheckTicket, DuplicateCheckController};
pub use debounce::Debouncer;
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Error types for duplicate checks.
//!
//! `InvalidInput` means "no check performed", not "no match".
//! `LookupError` is a store fault; the controller absorbs it and fails open.

use thiserror::Error;

use crate::policy::PolicyTypeTag;

/// A Policy Store Adapter call failed for one policy type.
#[derive(Debug, Clone, Error)]
#[error("lookup of {policy_type} policies failed: {reason}")]
pub struct LookupError {
    pub policy_type: PolicyTypeTag,
    pub reason: String,
}

impl LookupError {
    pub fn new(policy_type: PolicyTypeTag, reason: impl Into<String>) -> Self {
        LookupError {
            policy_type,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the resolver.
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("policy number too short to check: {length} characters (minimum {minimum})")]
    InvalidInput {
        length: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl CheckError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, CheckError::InvalidInput { .. })
    }
}

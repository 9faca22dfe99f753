// 🔤 Policy Number Normalization
// Canonical form for comparison only: no whitespace, upper case. Never persisted.

use crate::error::CheckError;
use std::fmt;

/// Inputs shorter than this (after normalization) are not checked at all
pub const MIN_POLICY_NUMBER_LEN: usize = 3;

/// Canonical policy number used for equality checks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPolicyNumber(String);

impl NormalizedPolicyNumber {
    /// Normalize without the length guard (used for stored records)
    pub fn new(raw: &str) -> Self {
        NormalizedPolicyNumber(canonicalize(raw))
    }

    /// Normalize a queried number, rejecting input too short to be meaningful
    pub fn parse(raw: &str) -> Result<Self, CheckError> {
        let normalized = Self::new(raw);
        let length = normalized.len();

        if length < MIN_POLICY_NUMBER_LEN {
            return Err(CheckError::InvalidInput {
                length,
                minimum: MIN_POLICY_NUMBER_LEN,
            });
        }

        Ok(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, not bytes
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Does a stored policy number canonically equal this one?
    pub fn matches(&self, stored: &str) -> bool {
        canonicalize(stored) == self.0
    }
}

impl fmt::Display for NormalizedPolicyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip every whitespace character and fold case
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

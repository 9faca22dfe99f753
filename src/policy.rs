// 📄 Policy Model - Type tags, records, and duplicate matches
// Records are owned by the backing store; this crate only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// POLICY TYPE TAG
// ============================================================================

/// Policy category. Each tag is bound to its own record family in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyTypeTag {
    Health,
    MotorPrivate,
    MotorCommercial,
    Life,
    Home,
    Travel,
}

impl PolicyTypeTag {
    /// Fixed iteration order. Earlier tags win when several types match.
    pub const ALL: [PolicyTypeTag; 6] = [
        PolicyTypeTag::Health,
        PolicyTypeTag::MotorPrivate,
        PolicyTypeTag::MotorCommercial,
        PolicyTypeTag::Life,
        PolicyTypeTag::Home,
        PolicyTypeTag::Travel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyTypeTag::Health => "health",
            PolicyTypeTag::MotorPrivate => "motor-private",
            PolicyTypeTag::MotorCommercial => "motor-commercial",
            PolicyTypeTag::Life => "life",
            PolicyTypeTag::Home => "home",
            PolicyTypeTag::Travel => "travel",
        }
    }

    /// Human-readable label for presenters
    pub fn label(&self) -> &'static str {
        match self {
            PolicyTypeTag::Health => "Health",
            PolicyTypeTag::MotorPrivate => "Motor (Private)",
            PolicyTypeTag::MotorCommercial => "Motor (Commercial)",
            PolicyTypeTag::Life => "Life",
            PolicyTypeTag::Home => "Home",
            PolicyTypeTag::Travel => "Travel",
        }
    }
}

impl fmt::Display for PolicyTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown policy type string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown policy type: {0}")]
pub struct UnknownPolicyType(pub String);

impl FromStr for PolicyTypeTag {
    type Err = UnknownPolicyType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_lowercase();
        PolicyTypeTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == lower)
            .ok_or_else(|| UnknownPolicyType(value.to_string()))
    }
}

// ============================================================================
// USER IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

// ============================================================================
// POLICY RECORD
// ============================================================================

/// Projection of a stored policy, just wide enough for matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Opaque store identifier
    pub id: String,

    /// User the policy belongs to
    pub owner: UserId,

    #[serde(rename = "type")]
    pub policy_type: PolicyTypeTag,

    /// Policy number exactly as stored
    pub policy_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurer_name: Option<String>,
}

// ============================================================================
// DUPLICATE MATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub policy_id: String,

    #[serde(rename = "type")]
    pub policy_type: PolicyTypeTag,

    /// Original (un-normalized) policy number of the existing record
    pub policy_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurer_name: Option<String>,
}

impl DuplicateMatch {
    pub(crate) fn from_record(policy_type: PolicyTypeTag, record: &PolicyRecord) -> Self {
        DuplicateMatch {
            policy_id: record.id.clone(),
            policy_type,
            policy_number: record.policy_number.clone(),
            insurer_name: record.insurer_name.clone(),
        }
    }

    /// Link to the existing policy: `/policies/{type}/{policyId}`
    pub fn link(&self) -> String {
        format!(
            "/policies/{}/{}",
            self.policy_type.as_str(),
            urlencoding::encode(&self.policy_id)
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

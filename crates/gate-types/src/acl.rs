//! Access-control rule types.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Outcome of an ACL rule. Stored as a string; anything that fails to parse
/// is an invariant violation, not a denial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclAction {
    Allow,
    Deny,
}

impl AclAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclAction::Allow => "allow",
            AclAction::Deny => "deny",
        }
    }
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored action string is neither allow nor deny.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidAclAction(pub String);

impl fmt::Display for InvalidAclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ACL action: {:?}", self.0)
    }
}

impl std::error::Error for InvalidAclAction {}

impl FromStr for AclAction {
    type Err = InvalidAclAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(AclAction::Allow),
            "deny" => Ok(AclAction::Deny),
            other => Err(InvalidAclAction(other.to_string())),
        }
    }
}

/// A rule as loaded for evaluation: the pair of groups it binds plus the raw
/// action string (parsed at evaluation time so bad data surfaces loudly).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct AclRule {
    /// Primary key identifier.
    pub id: i64,
    /// Caller group this rule binds.
    pub user_group_id: i64,
    /// Host group this rule binds.
    pub host_group_id: i64,
    /// `allow` or `deny`; validated when evaluated.
    pub action: String,
}

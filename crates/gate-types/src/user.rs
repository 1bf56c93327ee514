//! User and SSH key binding records.

use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// A caller identity. Anonymous callers are represented by [`User::anonymous`]
/// (id 0) so the connection context never has to juggle an `Option`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct User {
    /// Primary key identifier; 0 for the anonymous placeholder.
    pub id: i64,
    /// Username, unique.
    pub name: String,
    /// Email, unique.
    pub email: String,
    /// Pending single-use invite token, cleared on redemption.
    pub invite_token: Option<String>,
}

impl User {
    /// Placeholder used when credential material does not resolve to anyone.
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            name: "Anonymous".to_string(),
            email: String::new(),
            invite_token: None,
        }
    }

    /// Whether this is a real stored identity rather than the placeholder.
    pub fn is_resolved(&self) -> bool {
        self.id > 0
    }
}

/// One-to-one binding from a canonical authorized-key string to a user.
/// Created at registration or invite redemption, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct UserKey {
    /// Primary key identifier.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Canonical OpenSSH `authorized_keys` representation; lookup key.
    pub authorized_key: String,
    /// Free-form note recorded at creation.
    pub comment: Option<String>,
}

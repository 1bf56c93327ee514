//! Session audit records.

use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Lifecycle state of an audited relay session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }
}

/// One relay session: created `active` before the first byte flows, closed
/// exactly once after the relay loop terminates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct SessionRecord {
    /// Primary key identifier.
    pub id: i64,
    /// Caller that opened the session.
    pub user_id: i64,
    /// Host that was relayed to.
    pub host_id: i64,
    /// `active` or `closed`.
    pub status: String,
    /// Terminal error, empty for a normal teardown.
    pub err_msg: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Close time, epoch milliseconds; set exactly once.
    pub stopped_at: Option<i64>,
}

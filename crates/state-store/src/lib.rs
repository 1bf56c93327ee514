//! State management for gatehouse - database operations and persistence.
//!
//! This crate is the only place that talks SQL. The serving core consumes a
//! narrow contract: identity lookups keyed by name/email/key-string, field
//! updates for invite clearing and host-key pinning, and session audit
//! create/close.
//!
//! ## Module Structure
//!
//! - `db`: Database initialization, migration, and connection management
//! - `users`: User, key-binding, and invite-token operations
//! - `hosts`: Host lookup and trust-on-first-use key pinning
//! - `acl`: Group membership and ACL rule queries
//! - `sessions`: Session audit record lifecycle
//! - `error`: Error types and results

mod acl;
mod db;
mod error;
mod hosts;
mod sessions;
mod users;

pub use acl::*;
pub use db::*;
pub use error::{DbError, DbResult};
// Re-export domain types so callers rarely need gate-types directly.
pub use gate_types::{
    AclRule, Host, SessionRecord, User, UserKey, state::DbHandle,
};
pub use hosts::*;
pub use sessions::*;
pub use users::*;

#[cfg(test)]
mod tests;

//! Shared domain types for the gatehouse bastion.
//!
//! These types are deliberately plain: persistence lives in `state-store` and
//! behavior lives in `server-core`. Keeping the records here lets both crates
//! agree on shapes without depending on each other.

pub mod acl;
pub mod auth;
pub mod host;
pub mod session;
pub mod state;
pub mod user;

pub use acl::{AclAction, AclRule};
pub use auth::{AuthMethod, ConnectionKind, INVITE_PREFIX};
pub use host::Host;
pub use session::{SessionRecord, SessionStatus};
pub use user::{User, UserKey};

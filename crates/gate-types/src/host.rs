//! Downstream host records.

use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// A backend host the bastion can relay to.
///
/// Credential fields hold `enc:v1:` ciphertext at rest; they are decrypted
/// transiently only after authorization allows a connection. `host_key` is the
/// trust-on-first-use pin: empty until the first successful contact, then
/// permanent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Host {
    /// Primary key identifier.
    pub id: i64,
    /// Human-readable name, unique; this is what callers present as the SSH
    /// username to reach the host.
    pub name: String,
    /// Endpoint in `host:port` form.
    pub addr: String,
    /// Username used for the outbound connection.
    pub login_user: String,
    /// Encrypted password credential, if any.
    pub password_enc: Option<String>,
    /// Encrypted private key credential, if any.
    pub private_key_enc: Option<String>,
    /// Pinned identity key blob; `None`/empty until first contact.
    pub host_key: Option<Vec<u8>>,
}

impl Host {
    /// Whether an identity key has been pinned for this host yet.
    pub fn has_pinned_key(&self) -> bool {
        self.host_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

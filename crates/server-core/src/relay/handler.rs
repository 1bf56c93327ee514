//! Client-side handler enforcing trust-on-first-use host key policy.

use std::sync::{Arc, Mutex};

use russh::{ChannelId, CryptoVec, client, keys};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Verifies the live target's identity key against the host's pinned value,
/// or pins it on first contact.
///
/// The pin write is a conditional update against the store, so two concurrent
/// first connections to the same host cannot both record different keys; the
/// loser of the race re-reads and compares against the winner's pin.
pub(crate) struct PinningVerifier {
    pub(crate) pool: SqlitePool,
    pub(crate) host_id: i64,
    pub(crate) host_name: String,
    /// Inbound channel used to warn the operator about mismatches.
    pub(crate) server_handle: russh::server::Handle,
    pub(crate) client_channel: ChannelId,
    /// Set when verification fails on a mismatch, so the bridge can report a
    /// trust violation rather than a generic connect error.
    pub(crate) mismatch: Arc<Mutex<Option<String>>>,
}

impl PinningVerifier {
    async fn record_mismatch(&self) {
        let msg = format!("host key mismatch for host {:?}; refusing to relay", self.host_name);
        warn!(host = %self.host_name, "{}", msg);
        if let Ok(mut slot) = self.mismatch.lock() {
            *slot = Some(msg.clone());
        }
        let mut payload = CryptoVec::new();
        payload.extend(format!("[gatehouse] {msg}\r\n").as_bytes());
        let _ = self.server_handle.data(self.client_channel, payload).await;
    }
}

impl client::Handler for PinningVerifier {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &keys::PublicKey) -> Result<bool, Self::Error> {
        let presented = match server_public_key.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(host = %self.host_name, error = %e, "failed to encode presented host key");
                return Ok(false);
            }
        };

        let pinned = match state_store::fetch_host_key(&self.pool, self.host_id).await {
            Ok(pin) => pin,
            Err(e) => {
                warn!(host = %self.host_name, error = %e, "state store failure reading host key pin");
                return Ok(false);
            }
        };

        match pinned {
            Some(pin) => {
                if pin == presented {
                    Ok(true)
                } else {
                    self.record_mismatch().await;
                    Ok(false)
                }
            }
            None => {
                // Trust-on-first-use: the first successful contact decides
                // the permanently trusted identity.
                info!(host = %self.host_name, "discovering host key fingerprint on first contact");
                match state_store::try_pin_host_key(&self.pool, self.host_id, &presented).await {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        // Lost a concurrent first-contact race; defer to the winner.
                        match state_store::fetch_host_key(&self.pool, self.host_id).await {
                            Ok(Some(pin)) if pin == presented => Ok(true),
                            Ok(_) => {
                                self.record_mismatch().await;
                                Ok(false)
                            }
                            Err(e) => {
                                warn!(host = %self.host_name, error = %e, "state store failure re-reading host key pin");
                                Ok(false)
                            }
                        }
                    }
                    Err(e) => {
                        warn!(host = %self.host_name, error = %e, "state store failure pinning host key");
                        Ok(false)
                    }
                }
            }
        }
    }
}

//! Outbound connection establishment and bidirectional byte bridging.

use std::sync::{Arc, Mutex};

use gate_types::Host;
use russh::{
    ChannelMsg, CryptoVec, client, keys::{self, PrivateKeyWithHashAlg}
};
use secrecy::ExposeSecret;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use super::{LOCAL_CLOSED_MSG, REMOTE_CLOSED_MSG, handler::PinningVerifier, normalize_close_err};
use crate::{
    error::{ServerError, ServerResult}, secrets::MasterSecret
};

type Result<T> = ServerResult<T>;

/// Live relay: data from the inbound channel is pushed through `input_tx`
/// into the bridge task. Dropping the handle closes the stream, which the
/// bridge treats as the local side hanging up.
pub(crate) struct RelayHandle {
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RelayHandle {
    pub(crate) fn send(&self, bytes: Vec<u8>) {
        let _ = self.input_tx.send(bytes);
    }
}

/// Build the client configuration for connecting to downstream hosts.
fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        nodelay: true,
        keepalive_interval: Some(std::time::Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Start an outbound SSH session to the target host and bridge IO between the
/// remote channel and the inbound client channel.
///
/// The session audit record (already `active`) is closed by the bridge task
/// after the relay loop fully terminates, with benign closure messages
/// normalized away. `server_handle` is used to push data back to the inbound
/// channel; `pty_size_rx` propagates window-size updates to the target.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn start_bridge(
    server_handle: russh::server::Handle,
    client_channel: russh::ChannelId,
    pool: SqlitePool,
    secrets: Arc<MasterSecret>,
    host: Host,
    session_id: i64,
    initial_size: (u16, u16),
    mut pty_size_rx: watch::Receiver<(u16, u16)>,
) -> Result<RelayHandle> {
    let cfg = build_client_config();

    let mismatch = Arc::new(Mutex::new(None));
    let verifier = PinningVerifier {
        pool: pool.clone(),
        host_id: host.id,
        host_name: host.name.clone(),
        server_handle: server_handle.clone(),
        client_channel,
        mismatch: mismatch.clone(),
    };

    info!(host = %host.name, addr = %host.addr, session_id, "connecting to downstream host");
    let mut remote = match client::connect(cfg, host.addr.as_str(), verifier).await {
        Ok(remote) => remote,
        Err(err) => {
            // Distinguish a trust violation from a generic connect failure.
            let mismatched = mismatch.lock().map(|slot| slot.is_some()).unwrap_or(false);
            if mismatched {
                return Err(ServerError::HostKeyMismatch { host: host.name });
            }
            return Err(err.into());
        }
    };

    authenticate_outbound(&mut remote, &host, &secrets).await?;

    let rchan = remote.channel_open_session().await?;
    let (cols, rows) = initial_size;
    rchan.request_pty(true, "xterm", cols as u32, rows as u32, 0, 0, &[]).await?;
    rchan.request_shell(true).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    // Single task handling remote->client, client->remote, and window
    // resizes; it owns closing the audit record when the loop ends.
    tokio::spawn(async move {
        let mut rchan = rchan; // move into task
        let cause: String = loop {
            tokio::select! {
                msg = rchan.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            let mut payload = CryptoVec::new();
                            payload.extend(&data);
                            if server_handle.data(client_channel, payload).await.is_err() {
                                break LOCAL_CLOSED_MSG.to_string();
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, .. }) => {
                            let mut payload = CryptoVec::new();
                            payload.extend(&data);
                            if server_handle.data(client_channel, payload).await.is_err() {
                                break LOCAL_CLOSED_MSG.to_string();
                            }
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                            let _ = server_handle.eof(client_channel).await;
                            let _ = server_handle.close(client_channel).await;
                            break REMOTE_CLOSED_MSG.to_string();
                        }
                        _ => {}
                    }
                }
                maybe_bytes = rx.recv() => {
                    match maybe_bytes {
                        Some(bytes) => {
                            if !bytes.is_empty() {
                                let mut cursor = std::io::Cursor::new(bytes);
                                if let Err(err) = rchan.data(&mut cursor).await {
                                    break err.to_string();
                                }
                            }
                        }
                        None => {
                            let _ = rchan.eof().await;
                            let _ = rchan.close().await;
                            break LOCAL_CLOSED_MSG.to_string();
                        }
                    }
                }
                changed = pty_size_rx.changed() => {
                    if changed.is_err() {
                        let _ = rchan.eof().await;
                        let _ = rchan.close().await;
                        break LOCAL_CLOSED_MSG.to_string();
                    }
                    let size = *pty_size_rx.borrow();
                    if rchan.window_change(size.0.max(1) as u32, size.1.max(1) as u32, 0, 0).await.is_err() {
                        break REMOTE_CLOSED_MSG.to_string();
                    }
                }
            }
        };

        // The close update happens-after the relay loop fully terminated, so
        // audit state never runs ahead of actual data flow.
        let err_msg = normalize_close_err(&cause);
        if let Err(db_err) = state_store::close_session(&pool, session_id, err_msg).await {
            error!(session_id, error = %db_err, "failed to close session record");
        }
        info!(session_id, cause = %cause, "relay session closed");
    });

    Ok(RelayHandle { input_tx: tx })
}

fn ensure_success(res: client::AuthResult, method: &str) -> Result<()> {
    match res {
        client::AuthResult::Success => Ok(()),
        client::AuthResult::Failure { .. } => Err(ServerError::Other(format!("downstream authentication failed via {method}"))),
    }
}

/// Authenticate to the target with its stored credential, decrypted
/// transiently. A private key wins over a password; the decrypted password
/// doubles as the key passphrase when the key material is itself encrypted.
async fn authenticate_outbound<H: client::Handler>(
    remote: &mut client::Handle<H>,
    host: &Host,
    secrets: &MasterSecret,
) -> Result<()> {
    let password = host
        .password_enc
        .as_deref()
        .map(|enc| secrets.decrypt_string_if_encrypted(enc))
        .transpose()
        .map_err(|e| ServerError::Crypto(e.to_string()))?;

    if let Some(key_enc) = host.private_key_enc.as_deref() {
        let pem = secrets
            .decrypt_string_if_encrypted(key_enc)
            .map_err(|e| ServerError::Crypto(e.to_string()))?;
        let passphrase = password.as_ref().map(|p| p.expose_secret().as_str());
        let key = keys::decode_secret_key(pem.expose_secret(), passphrase)?;

        // Pick best RSA hash if applicable (rsa-sha2-256/512 vs legacy ssh-rsa)
        let rsa_hint = remote.best_supported_rsa_hash().await.unwrap_or(None).flatten();
        let hash_alg = if key.algorithm().is_rsa() { rsa_hint } else { None };
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);
        let res = remote.authenticate_publickey(host.login_user.clone(), key).await?;
        return ensure_success(res, "publickey");
    }

    if let Some(password) = password {
        let res = remote
            .authenticate_password(host.login_user.clone(), password.expose_secret().clone())
            .await?;
        return ensure_success(res, "password");
    }

    Err(ServerError::Other(format!("no credential configured for host {:?}", host.name)))
}

//! SSH credential callbacks: the authentication resolver entry points.

use russh::server::Auth;
use tracing::{error, info, warn};

use super::{ConnectionHandler, display_addr};
use crate::context::{self, ConnectionContext};

impl ConnectionHandler {
    /// Password path: the password is never validated, only the health-probe
    /// identifier passes. See [`context::resolve_password`].
    pub(super) async fn handle_auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, russh::Error> {
        let ctx = context::resolve_password(user);
        let accepted = ctx.auth_success;
        self.context = Some(ctx);

        if accepted {
            info!(
                peer = %display_addr(self.peer_addr),
                connection = %self.connection_id,
                user,
                "password authentication accepted (health probe)"
            );
            Ok(Auth::Accept)
        } else {
            warn!(
                peer = %display_addr(self.peer_addr),
                connection = %self.connection_id,
                user,
                "password authentication rejected"
            );
            Ok(Auth::reject())
        }
    }

    /// Public-key path: the handshake always proceeds; unresolved callers get
    /// a deferred error rendered at channel time instead of a bare rejection.
    pub(super) async fn handle_auth_publickey(&mut self, user: &str, public_key: &russh::keys::PublicKey) -> Result<Auth, russh::Error> {
        let (authorized_key, key_blob) = match (public_key.to_openssh(), public_key.to_bytes()) {
            (Ok(s), Ok(b)) => (s, b),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to encode presented ssh key");
                return Ok(Auth::reject());
            }
        };

        let ctx = match context::resolve_public_key(&self.pool, user, &authorized_key, &key_blob).await {
            Ok(ctx) => ctx,
            Err(err) => {
                // Store failures abort this connection's resolution but must
                // not take the process down; surface them on the channel.
                error!(
                    peer = %display_addr(self.peer_addr),
                    connection = %self.connection_id,
                    error = %err,
                    "state store failure during public-key resolution"
                );
                let mut ctx = context::resolve_password(user);
                ctx.auth_method = gate_types::AuthMethod::PublicKey;
                ctx.auth_success = true;
                ctx.error = Some(format!("internal error: {err}"));
                ctx
            }
        };

        log_resolution(self, user, &ctx);
        self.context = Some(ctx);
        Ok(Auth::Accept)
    }
}

fn log_resolution(handler: &ConnectionHandler, user: &str, ctx: &ConnectionContext) {
    if ctx.user.is_resolved() {
        info!(
            peer = %display_addr(handler.peer_addr),
            connection = %handler.connection_id,
            input = user,
            caller = %ctx.user.name,
            method = ctx.auth_method.as_str(),
            kind = ctx.kind().as_str(),
            "public key resolved"
        );
    } else {
        info!(
            peer = %display_addr(handler.peer_addr),
            connection = %handler.connection_id,
            input = user,
            kind = ctx.kind().as_str(),
            deferred = ctx.error.as_deref().unwrap_or(""),
            "public key unresolved; deferring"
        );
    }
}

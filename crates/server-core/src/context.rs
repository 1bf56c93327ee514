//! Per-connection context and the authentication resolver.
//!
//! A [`ConnectionContext`] is created exactly once during the credential
//! phase and is read-only afterwards; channel-open logic only classifies
//! intent, it never re-authenticates. The public-key path always reports
//! handshake success to the transport and instead carries a deferred error,
//! so the denial reason can be written to an interactive channel rather than
//! surfacing as a bare rejection.

use gate_types::{AuthMethod, ConnectionKind, INVITE_PREFIX, User, UserKey};
use sqlx::SqlitePool;
use state_store::DbResult;
use tracing::info;

#[derive(Clone, Debug)]
pub struct ConnectionContext {
    /// The string presented as the remote username; overloaded routing field.
    pub input_username: String,
    /// Resolved caller, or the anonymous placeholder.
    pub user: User,
    /// The key binding that resolved the caller, when public-key auth matched.
    pub user_key: Option<UserKey>,
    /// Which credential mechanism produced this context.
    pub auth_method: AuthMethod,
    /// Whether the handshake may continue. Decided once, never re-evaluated.
    pub auth_success: bool,
    /// Text to display once a channel opens (e.g. invite welcome).
    pub message: Option<String>,
    /// Deferred failure to surface once a channel is available.
    pub error: Option<String>,
}

impl ConnectionContext {
    /// Classify what this connection wants. Pure and recomputed on demand.
    pub fn kind(&self) -> ConnectionKind {
        ConnectionKind::classify(&self.input_username, &self.user)
    }

    fn anonymous(input_username: &str, auth_method: AuthMethod) -> Self {
        Self {
            input_username: input_username.to_string(),
            user: User::anonymous(),
            user_key: None,
            auth_method,
            auth_success: false,
            message: None,
            error: None,
        }
    }
}

/// Password credential check.
///
/// The password value itself is never validated: this mechanism exists solely
/// to let unauthenticated liveness probes through without a key. Every other
/// identifier fails outright.
pub fn resolve_password(input_username: &str) -> ConnectionContext {
    let mut ctx = ConnectionContext::anonymous(input_username, AuthMethod::Password);
    ctx.auth_success = ctx.kind() == ConnectionKind::HealthCheck;
    ctx
}

/// Public-key credential check.
///
/// Always yields `auth_success = true`; when the key resolves to nobody the
/// context carries the anonymous placeholder plus a deferred error instead.
pub async fn resolve_public_key(
    pool: &SqlitePool,
    input_username: &str,
    authorized_key: &str,
    key_blob: &[u8],
) -> DbResult<ConnectionContext> {
    let mut ctx = ConnectionContext::anonymous(input_username, AuthMethod::PublicKey);
    ctx.auth_success = true;

    // Known key: resolve the owning caller.
    if let Some(user_key) = state_store::fetch_user_key_by_authorized_key(pool, authorized_key).await? {
        if let Some(user) = state_store::fetch_user_by_id(pool, user_key.user_id).await? {
            ctx.user = user;
            ctx.user_key = Some(user_key);
            if ctx.kind() == ConnectionKind::Invite {
                ctx.error = Some(format!(
                    "invites are only supported for new SSH keys; your ssh key is already associated with the user {:?}",
                    ctx.user.email
                ));
            }
            return Ok(ctx);
        }
    }

    // Unknown key asking for invite redemption.
    if ctx.kind() == ConnectionKind::Invite {
        let token = ctx.input_username.strip_prefix(INVITE_PREFIX).unwrap_or_default();
        let user = if token.is_empty() {
            None
        } else {
            state_store::fetch_user_by_invite_token(pool, token).await?
        };

        match user {
            Some(user) => {
                let key_id = state_store::create_user_key(pool, user.id, authorized_key, key_blob, Some("created by gatehouse")).await?;
                // Token is only usable once.
                state_store::clear_invite_token(pool, user.id).await?;
                info!(user = %user.name, key_id, "invite redeemed; key bound");

                ctx.message = Some(format!(
                    "Welcome {}!\n\nYour key is now associated with the user {:?}.\n",
                    user.name, user.email
                ));
                ctx.user = user;
            }
            None => {
                ctx.error = Some("your token is invalid or expired".to_string());
            }
        }
        return Ok(ctx);
    }

    // Fallback: unknown key, not an invite.
    ctx.error = Some("unknown ssh key".to_string());
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        state_store::migrate(&pool).await.unwrap();
        pool
    }

    const ALICE_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAlice alice";
    const NEW_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAINewKey fresh";

    #[test]
    fn password_succeeds_only_for_healthcheck() {
        assert!(resolve_password("healthcheck").auth_success);
        for identifier in ["alice", "admin", "invite:abc", "web01", ""] {
            assert!(!resolve_password(identifier).auth_success, "identifier {identifier:?}");
        }
    }

    #[tokio::test]
    async fn known_key_resolves_caller() {
        let pool = setup_db().await;
        let alice = state_store::create_user(&pool, "alice", "alice@example.com", None).await.unwrap();
        state_store::create_user_key(&pool, alice, ALICE_KEY, b"blob", None).await.unwrap();

        let ctx = resolve_public_key(&pool, "web01", ALICE_KEY, b"blob").await.unwrap();
        assert!(ctx.auth_success);
        assert_eq!(ctx.user.id, alice);
        assert_eq!(ctx.kind(), ConnectionKind::Bastion);
        assert!(ctx.error.is_none());
    }

    #[tokio::test]
    async fn known_key_cannot_redeem_invites() {
        let pool = setup_db().await;
        let alice = state_store::create_user(&pool, "alice", "alice@example.com", None).await.unwrap();
        state_store::create_user_key(&pool, alice, ALICE_KEY, b"blob", None).await.unwrap();

        let ctx = resolve_public_key(&pool, "invite:whatever", ALICE_KEY, b"blob").await.unwrap();
        assert!(ctx.auth_success);
        let err = ctx.error.expect("deferred error expected");
        assert!(err.contains("invites are only supported for new SSH keys"));
    }

    #[tokio::test]
    async fn invite_redemption_is_exactly_once() {
        let pool = setup_db().await;
        let alice = state_store::create_user(&pool, "alice", "alice@example.com", Some("abc123")).await.unwrap();

        let ctx = resolve_public_key(&pool, "invite:abc123", NEW_KEY, b"new-blob").await.unwrap();
        assert!(ctx.auth_success);
        assert_eq!(ctx.user.id, alice);
        assert!(ctx.error.is_none());
        assert!(ctx.message.as_deref().unwrap().contains("Welcome alice!"));

        // Key is now bound and the token consumed.
        let bound = state_store::fetch_user_key_by_authorized_key(&pool, NEW_KEY).await.unwrap();
        assert_eq!(bound.unwrap().user_id, alice);

        // Replaying the token with a different key fails.
        let other = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOther other";
        let replay = resolve_public_key(&pool, "invite:abc123", other, b"other-blob").await.unwrap();
        assert!(replay.auth_success);
        assert!(!replay.user.is_resolved());
        assert_eq!(replay.error.as_deref(), Some("your token is invalid or expired"));
    }

    #[tokio::test]
    async fn empty_invite_token_is_invalid() {
        let pool = setup_db().await;
        let ctx = resolve_public_key(&pool, "invite:", NEW_KEY, b"new-blob").await.unwrap();
        assert!(ctx.auth_success);
        assert_eq!(ctx.error.as_deref(), Some("your token is invalid or expired"));
    }

    #[tokio::test]
    async fn unknown_key_defers_error() {
        let pool = setup_db().await;
        let ctx = resolve_public_key(&pool, "db01", NEW_KEY, b"new-blob").await.unwrap();
        assert!(ctx.auth_success, "handshake still proceeds");
        assert!(!ctx.user.is_resolved());
        assert_eq!(ctx.error.as_deref(), Some("unknown ssh key"));
        assert_eq!(ctx.kind(), ConnectionKind::Bastion);
    }
}

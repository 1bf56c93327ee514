//! Credential mechanisms and connection-kind classification.

use serde::{Deserialize, Serialize};

use crate::user::User;

/// Which credential mechanism produced a connection context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    Password,
    PublicKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::PublicKey => "pubkey",
        }
    }
}

/// Reserved identifier that routes to the liveness probe.
pub const HEALTHCHECK_NAME: &str = "healthcheck";
/// Identifier alias that always routes to the administrative shell.
pub const ADMIN_ALIAS: &str = "admin";
/// Prefix that routes to invite redemption; the token follows the colon.
pub const INVITE_PREFIX: &str = "invite:";

/// What a connection wants, derived from the presented identifier and the
/// resolved caller. Never stored; recomputed wherever needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Unauthenticated liveness probe.
    HealthCheck,
    /// Interactive administrative shell for the caller themselves.
    Shell,
    /// One-time token redemption binding a new key to an existing user.
    Invite,
    /// Relay to a downstream host named by the identifier.
    Bastion,
}

impl ConnectionKind {
    /// Classify an identifier against a resolved caller.
    ///
    /// Precedence is fixed and callers downstream depend on it exactly:
    /// healthcheck > shell > invite > bastion. The healthcheck literal wins
    /// even if a user by that name exists.
    pub fn classify(input_username: &str, user: &User) -> Self {
        if input_username == HEALTHCHECK_NAME {
            ConnectionKind::HealthCheck
        } else if (user.is_resolved() && (input_username == user.name || input_username == user.email))
            || input_username == ADMIN_ALIAS
        {
            ConnectionKind::Shell
        } else if input_username.starts_with(INVITE_PREFIX) {
            ConnectionKind::Invite
        } else {
            ConnectionKind::Bastion
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::HealthCheck => "healthcheck",
            ConnectionKind::Shell => "shell",
            ConnectionKind::Invite => "invite",
            ConnectionKind::Bastion => "bastion",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User {
            id: 1,
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            invite_token: None,
        }
    }

    #[test]
    fn classification_precedence() {
        let anon = User::anonymous();
        assert_eq!(ConnectionKind::classify("healthcheck", &anon), ConnectionKind::HealthCheck);
        assert_eq!(ConnectionKind::classify("admin", &anon), ConnectionKind::Shell);
        assert_eq!(ConnectionKind::classify("invite:abc123", &anon), ConnectionKind::Invite);
        assert_eq!(ConnectionKind::classify("db01", &anon), ConnectionKind::Bastion);
    }

    #[test]
    fn healthcheck_wins_even_for_matching_user() {
        // A user literally named "healthcheck" still routes to the probe.
        let user = User {
            id: 7,
            name: "healthcheck".to_string(),
            email: "hc@example.com".to_string(),
            invite_token: None,
        };
        assert_eq!(ConnectionKind::classify("healthcheck", &user), ConnectionKind::HealthCheck);
    }

    #[test]
    fn resolved_user_matches_name_or_email() {
        let user = alice();
        assert_eq!(ConnectionKind::classify("alice", &user), ConnectionKind::Shell);
        assert_eq!(ConnectionKind::classify("alice@example.com", &user), ConnectionKind::Shell);
        assert_eq!(ConnectionKind::classify("web01", &user), ConnectionKind::Bastion);
    }

    #[test]
    fn anonymous_caller_never_matches_shell_by_name() {
        // The placeholder's name must not accidentally classify as shell.
        let anon = User::anonymous();
        assert_eq!(ConnectionKind::classify("Anonymous", &anon), ConnectionKind::Bastion);
        assert_eq!(ConnectionKind::classify("", &anon), ConnectionKind::Bastion);
    }

    #[test]
    fn invite_beats_bastion_for_resolved_users_too() {
        let user = alice();
        assert_eq!(ConnectionKind::classify("invite:zzz", &user), ConnectionKind::Invite);
    }
}

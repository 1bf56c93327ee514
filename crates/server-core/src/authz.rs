//! Group-based ACL evaluation for bastion connections.

use gate_types::{AclAction, AclRule, Host, User};
use sqlx::SqlitePool;

use crate::error::{ServerError, ServerResult};

/// Evaluate the rules matching a caller/host pair.
///
/// The decision is allow unless any matching rule says deny; deny takes
/// precedence when both match. A rule whose action fails to parse is a
/// programming-invariant violation and aborts the attempt, it is not a
/// denial.
pub fn evaluate_rules(rules: &[AclRule]) -> ServerResult<AclAction> {
    let mut decision = AclAction::Allow;
    for rule in rules {
        match rule.action.parse::<AclAction>() {
            Ok(AclAction::Allow) => {}
            Ok(AclAction::Deny) => decision = AclAction::Deny,
            Err(invalid) => return Err(ServerError::InvalidAclAction(invalid.0)),
        }
    }
    Ok(decision)
}

/// Authorize a caller against a target host, or fail with the denial error
/// shown to the operator.
pub async fn check_access(pool: &SqlitePool, user: &User, host: &Host) -> ServerResult<()> {
    let rules = state_store::fetch_matching_acls(pool, user.id, host.id).await?;
    match evaluate_rules(&rules)? {
        AclAction::Allow => Ok(()),
        AclAction::Deny => Err(ServerError::AccessDenied { host: host.name.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: i64, action: &str) -> AclRule {
        AclRule {
            id,
            user_group_id: 1,
            host_group_id: 1,
            action: action.to_string(),
        }
    }

    #[test]
    fn no_matching_rules_allows() {
        assert_eq!(evaluate_rules(&[]).unwrap(), AclAction::Allow);
    }

    #[test]
    fn deny_takes_precedence_over_allow() {
        let rules = [rule(1, "allow"), rule(2, "deny")];
        assert_eq!(evaluate_rules(&rules).unwrap(), AclAction::Deny);

        // Order must not matter.
        let rules = [rule(1, "deny"), rule(2, "allow")];
        assert_eq!(evaluate_rules(&rules).unwrap(), AclAction::Deny);
    }

    #[test]
    fn unknown_action_is_an_invariant_violation() {
        let rules = [rule(1, "allow"), rule(2, "maybe")];
        match evaluate_rules(&rules) {
            Err(ServerError::InvalidAclAction(action)) => assert_eq!(action, "maybe"),
            other => panic!("expected invalid-action error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_access_end_to_end() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        state_store::migrate(&pool).await.unwrap();

        let alice_id = state_store::create_user(&pool, "alice", "alice@example.com", None).await.unwrap();
        let host_id = state_store::create_host(&pool, "web01", "10.0.0.5:22", "root", None, None)
            .await
            .unwrap();
        let alice = state_store::fetch_user_by_id(&pool, alice_id).await.unwrap().unwrap();
        let web01 = state_store::fetch_host_by_name(&pool, "web01").await.unwrap().unwrap();

        // No rules at all: allowed.
        check_access(&pool, &alice, &web01).await.unwrap();

        state_store::create_user_group(&pool, "ops").await.unwrap();
        state_store::create_host_group(&pool, "web").await.unwrap();
        state_store::add_user_to_group(&pool, alice_id, "ops").await.unwrap();
        state_store::add_host_to_group(&pool, host_id, "web").await.unwrap();
        state_store::create_acl(&pool, "ops", "web", "allow", None).await.unwrap();
        check_access(&pool, &alice, &web01).await.unwrap();

        // A deny rule on the same pair flips the decision.
        state_store::create_acl(&pool, "ops", "web", "deny", Some("maintenance")).await.unwrap();
        match check_access(&pool, &alice, &web01).await {
            Err(ServerError::AccessDenied { host }) => assert_eq!(host, "web01"),
            other => panic!("expected denial, got {other:?}"),
        }
    }
}

use sqlx::SqlitePool;

use crate::*;

async fn setup_db() -> SqlitePool {
    // Use in-memory DB for testing
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    migrate(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn user_and_key_lookup() {
    let pool = setup_db().await;

    let alice = create_user(&pool, "alice", "alice@example.com", None).await.unwrap();
    create_user_key(&pool, alice, "ssh-ed25519 AAAAC3... alice", b"blob-a", Some("laptop"))
        .await
        .unwrap();

    let key = fetch_user_key_by_authorized_key(&pool, "ssh-ed25519 AAAAC3... alice")
        .await
        .unwrap()
        .expect("key binding should exist");
    assert_eq!(key.user_id, alice);

    // Lookup is exact-string; a near miss resolves nothing.
    assert!(
        fetch_user_key_by_authorized_key(&pool, "ssh-ed25519 AAAAC3... bob")
            .await
            .unwrap()
            .is_none()
    );

    let alice_row = fetch_user_by_id(&pool, alice).await.unwrap().unwrap();
    assert_eq!(alice_row.email, "alice@example.com");
}

#[tokio::test]
async fn invite_token_is_single_use() {
    let pool = setup_db().await;

    let bob = create_user(&pool, "bob", "bob@example.com", Some("abc123")).await.unwrap();
    let found = fetch_user_by_invite_token(&pool, "abc123").await.unwrap().unwrap();
    assert_eq!(found.id, bob);

    clear_invite_token(&pool, bob).await.unwrap();
    assert!(fetch_user_by_invite_token(&pool, "abc123").await.unwrap().is_none());
    assert!(fetch_user_by_id(&pool, bob).await.unwrap().unwrap().invite_token.is_none());
}

#[tokio::test]
async fn host_key_pin_is_compare_and_set() {
    let pool = setup_db().await;
    let host = create_host(&pool, "web01", "10.0.0.5:22", "root", None, None).await.unwrap();

    assert!(fetch_host_key(&pool, host).await.unwrap().is_none());

    // First writer wins.
    assert!(try_pin_host_key(&pool, host, b"key-one").await.unwrap());
    assert_eq!(fetch_host_key(&pool, host).await.unwrap().unwrap(), b"key-one");

    // A concurrent second first-contact must not overwrite the pin.
    assert!(!try_pin_host_key(&pool, host, b"key-two").await.unwrap());
    assert_eq!(fetch_host_key(&pool, host).await.unwrap().unwrap(), b"key-one");

    assert!(fetch_host_by_name(&pool, "web01").await.unwrap().unwrap().has_pinned_key());
}

#[tokio::test]
async fn matching_acls_require_both_group_intersections() {
    let pool = setup_db().await;

    let alice = create_user(&pool, "alice", "alice@example.com", None).await.unwrap();
    let web01 = create_host(&pool, "web01", "10.0.0.5:22", "root", None, None).await.unwrap();
    let db01 = create_host(&pool, "db01", "10.0.0.6:22", "root", None, None).await.unwrap();

    create_user_group(&pool, "ops").await.unwrap();
    create_host_group(&pool, "web").await.unwrap();
    create_host_group(&pool, "db").await.unwrap();

    add_user_to_group(&pool, alice, "ops").await.unwrap();
    add_host_to_group(&pool, web01, "web").await.unwrap();
    add_host_to_group(&pool, db01, "db").await.unwrap();

    create_acl(&pool, "ops", "web", "allow", None).await.unwrap();

    assert_eq!(fetch_user_group_ids(&pool, alice).await.unwrap().len(), 1);
    assert_eq!(fetch_host_group_ids(&pool, web01).await.unwrap().len(), 1);

    let rules = fetch_matching_acls(&pool, alice, web01).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].action, "allow");

    // db01 is in no group the rule covers, so nothing matches.
    assert!(fetch_matching_acls(&pool, alice, db01).await.unwrap().is_empty());
}

#[tokio::test]
async fn session_lifecycle_round_trip() {
    let pool = setup_db().await;

    let alice = create_user(&pool, "alice", "alice@example.com", None).await.unwrap();
    let web01 = create_host(&pool, "web01", "10.0.0.5:22", "root", None, None).await.unwrap();

    let sid = create_session(&pool, alice, web01).await.unwrap();

    let active = list_active_sessions(&pool).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, sid);
    assert_eq!(active[0].status, "active");
    assert!(active[0].stopped_at.is_none());

    close_session(&pool, sid, "").await.unwrap();

    let closed = fetch_session(&pool, sid).await.unwrap().unwrap();
    assert_eq!(closed.status, "closed");
    assert_eq!(closed.err_msg, "");
    assert!(closed.stopped_at.is_some());
    assert!(list_active_sessions(&pool).await.unwrap().is_empty());
}

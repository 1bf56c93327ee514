//! User, key-binding, and invite-token operations.

use gate_types::{User, UserKey};
use sqlx::{Row, SqlitePool};

use crate::{DbResult, db::current_ts};

const USER_COLUMNS: &str = "id, name, email, invite_token";

pub async fn create_user(pool: &SqlitePool, name: &str, email: &str, invite_token: Option<&str>) -> DbResult<i64> {
    let result = sqlx::query("INSERT INTO users (name, email, invite_token, created_at) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(invite_token)
        .bind(current_ts())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn fetch_user_by_id(pool: &SqlitePool, user_id: i64) -> DbResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Exact-match lookup of a key binding by its canonical authorized-key string.
pub async fn fetch_user_key_by_authorized_key(pool: &SqlitePool, authorized_key: &str) -> DbResult<Option<UserKey>> {
    let key = sqlx::query_as::<_, UserKey>("SELECT id, user_id, authorized_key, comment FROM user_keys WHERE authorized_key = ?")
        .bind(authorized_key)
        .fetch_optional(pool)
        .await?;
    Ok(key)
}

/// Find the user holding a pending invite token, if any.
pub async fn fetch_user_by_invite_token(pool: &SqlitePool, token: &str) -> DbResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE invite_token = ?"))
        .bind(token)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Bind a presented public key to a user. The authorized-key string is unique,
/// so re-binding the same key is a constraint error.
pub async fn create_user_key(
    pool: &SqlitePool,
    user_id: i64,
    authorized_key: &str,
    key_blob: &[u8],
    comment: Option<&str>,
) -> DbResult<i64> {
    let result = sqlx::query("INSERT INTO user_keys (user_id, authorized_key, key_blob, comment, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(user_id)
        .bind(authorized_key)
        .bind(key_blob)
        .bind(comment)
        .bind(current_ts())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Clear a redeemed invite token; tokens are single use.
pub async fn clear_invite_token(pool: &SqlitePool, user_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE users SET invite_token = NULL WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_user_group_ids(pool: &SqlitePool, user_id: i64) -> DbResult<Vec<i64>> {
    let rows = sqlx::query("SELECT group_id FROM user_group_members WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.get::<i64, _>("group_id")).collect())
}

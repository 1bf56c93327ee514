//! Group membership and ACL rule queries.

use gate_types::AclRule;
use sqlx::{Row, SqlitePool};

use crate::{DbError, DbResult, db::current_ts};

pub async fn create_user_group(pool: &SqlitePool, name: &str) -> DbResult<i64> {
    sqlx::query("INSERT INTO user_groups (name) VALUES (?)").bind(name).execute(pool).await?;
    let row = sqlx::query("SELECT id FROM user_groups WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("id"))
}

pub async fn create_host_group(pool: &SqlitePool, name: &str) -> DbResult<i64> {
    sqlx::query("INSERT INTO host_groups (name) VALUES (?)").bind(name).execute(pool).await?;
    let row = sqlx::query("SELECT id FROM host_groups WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("id"))
}

pub async fn add_user_to_group(pool: &SqlitePool, user_id: i64, group_name: &str) -> DbResult<()> {
    let row = sqlx::query("SELECT id FROM user_groups WHERE name = ?")
        .bind(group_name)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::GroupNotFound {
            group: group_name.to_string(),
        })?;
    sqlx::query("INSERT OR IGNORE INTO user_group_members (user_id, group_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(row.get::<i64, _>("id"))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn add_host_to_group(pool: &SqlitePool, host_id: i64, group_name: &str) -> DbResult<()> {
    let row = sqlx::query("SELECT id FROM host_groups WHERE name = ?")
        .bind(group_name)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::GroupNotFound {
            group: group_name.to_string(),
        })?;
    sqlx::query("INSERT OR IGNORE INTO host_group_members (host_id, group_id) VALUES (?, ?)")
        .bind(host_id)
        .bind(row.get::<i64, _>("id"))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_acl(pool: &SqlitePool, user_group: &str, host_group: &str, action: &str, comment: Option<&str>) -> DbResult<i64> {
    let ug = sqlx::query("SELECT id FROM user_groups WHERE name = ?")
        .bind(user_group)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::GroupNotFound {
            group: user_group.to_string(),
        })?;
    let hg = sqlx::query("SELECT id FROM host_groups WHERE name = ?")
        .bind(host_group)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::GroupNotFound {
            group: host_group.to_string(),
        })?;
    let result = sqlx::query("INSERT INTO acls (user_group_id, host_group_id, action, comment, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(ug.get::<i64, _>("id"))
        .bind(hg.get::<i64, _>("id"))
        .bind(action)
        .bind(comment)
        .bind(current_ts())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Rules whose caller-group intersects the user's groups AND whose host-group
/// intersects the host's groups. The serving core evaluates the returned
/// actions; unmatched pairs yield an empty vec (default allow).
pub async fn fetch_matching_acls(pool: &SqlitePool, user_id: i64, host_id: i64) -> DbResult<Vec<AclRule>> {
    let rules = sqlx::query_as::<_, AclRule>(
        "SELECT a.id, a.user_group_id, a.host_group_id, a.action FROM acls a
         JOIN user_group_members ugm ON ugm.group_id = a.user_group_id AND ugm.user_id = ?
         JOIN host_group_members hgm ON hgm.group_id = a.host_group_id AND hgm.host_id = ?
         ORDER BY a.id",
    )
    .bind(user_id)
    .bind(host_id)
    .fetch_all(pool)
    .await?;
    Ok(rules)
}

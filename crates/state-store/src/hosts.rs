//! Host lookup and trust-on-first-use key pinning.

use gate_types::Host;
use sqlx::{Row, SqlitePool};

use crate::{DbResult, db::current_ts};

const HOST_COLUMNS: &str = "id, name, addr, login_user, password_enc, private_key_enc, host_key";

pub async fn create_host(
    pool: &SqlitePool,
    name: &str,
    addr: &str,
    login_user: &str,
    password_enc: Option<&str>,
    private_key_enc: Option<&str>,
) -> DbResult<i64> {
    let result = sqlx::query(
        "INSERT INTO hosts (name, addr, login_user, password_enc, private_key_enc, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(addr)
    .bind(login_user)
    .bind(password_enc)
    .bind(private_key_enc)
    .bind(current_ts())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn fetch_host_by_name(pool: &SqlitePool, name: &str) -> DbResult<Option<Host>> {
    let host = sqlx::query_as::<_, Host>(&format!("SELECT {HOST_COLUMNS} FROM hosts WHERE name = ?"))
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(host)
}

pub async fn list_host_names(pool: &SqlitePool) -> DbResult<Vec<(String, String)>> {
    let rows = sqlx::query("SELECT name, addr FROM hosts ORDER BY name").fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|r| (r.get::<String, _>("name"), r.get::<String, _>("addr")))
        .collect())
}

/// Current pinned identity key for a host, if one has been recorded.
pub async fn fetch_host_key(pool: &SqlitePool, host_id: i64) -> DbResult<Option<Vec<u8>>> {
    let row = sqlx::query("SELECT host_key FROM hosts WHERE id = ?")
        .bind(host_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(|r| r.get::<Option<Vec<u8>>, _>("host_key")).filter(|k| !k.is_empty()))
}

/// Conditionally pin a host identity key on first contact.
///
/// The update only lands when no key is pinned yet, so two concurrent first
/// connections cannot both win: exactly one caller sees `true`, the loser must
/// re-read the pin and compare against it.
pub async fn try_pin_host_key(pool: &SqlitePool, host_id: i64, key: &[u8]) -> DbResult<bool> {
    let result = sqlx::query("UPDATE hosts SET host_key = ? WHERE id = ? AND (host_key IS NULL OR host_key = x'')")
        .bind(key)
        .bind(host_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_host_group_ids(pool: &SqlitePool, host_id: i64) -> DbResult<Vec<i64>> {
    let rows = sqlx::query("SELECT group_id FROM host_group_members WHERE host_id = ?")
        .bind(host_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.get::<i64, _>("group_id")).collect())
}

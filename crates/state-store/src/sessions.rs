//! Session audit record lifecycle.
//!
//! A record is created with status `active` before the first relayed byte so
//! in-progress sessions are observable, and closed exactly once after the
//! relay loop fully terminates.

use gate_types::{SessionRecord, SessionStatus};
use sqlx::SqlitePool;

use crate::{DbResult, db::current_ts};

const SESSION_COLUMNS: &str = "id, user_id, host_id, status, err_msg, created_at, stopped_at";

pub async fn create_session(pool: &SqlitePool, user_id: i64, host_id: i64) -> DbResult<i64> {
    let result = sqlx::query("INSERT INTO sessions (user_id, host_id, status, err_msg, created_at) VALUES (?, ?, ?, '', ?)")
        .bind(user_id)
        .bind(host_id)
        .bind(SessionStatus::Active.as_str())
        .bind(current_ts())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Mark a session closed with its terminal error (already normalized by the
/// relay controller; benign teardown arrives here as an empty string).
pub async fn close_session(pool: &SqlitePool, session_id: i64, err_msg: &str) -> DbResult<()> {
    sqlx::query("UPDATE sessions SET status = ?, err_msg = ?, stopped_at = ? WHERE id = ?")
        .bind(SessionStatus::Closed.as_str())
        .bind(err_msg)
        .bind(current_ts())
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_session(pool: &SqlitePool, session_id: i64) -> DbResult<Option<SessionRecord>> {
    let session = sqlx::query_as::<_, SessionRecord>(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    Ok(session)
}

pub async fn list_active_sessions(pool: &SqlitePool) -> DbResult<Vec<SessionRecord>> {
    let sessions = sqlx::query_as::<_, SessionRecord>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = 'active' ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    Ok(sessions)
}

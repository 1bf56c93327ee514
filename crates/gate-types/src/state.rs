//! Handle describing an opened state database.

use std::path::PathBuf;

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Wrapper for a live database connection plus how it was opened.
#[cfg(feature = "sqlx")]
#[derive(Clone, Debug)]
pub struct DbHandle {
    /// Shared connection pool used by callers.
    pub pool: SqlitePool,
    /// Connection URL used to construct the pool.
    pub url: String,
    /// Filesystem path when backed by a local file; `None` for pure URLs.
    pub path: Option<PathBuf>,
    /// True when the database file (or in-memory DB) was just created.
    pub freshly_created: bool,
}

#[cfg(feature = "sqlx")]
impl DbHandle {
    /// Consume the handle and return the underlying pool.
    pub fn into_pool(self) -> SqlitePool {
        self.pool
    }
}

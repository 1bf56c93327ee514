use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when interacting with the state store.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to the database
    #[error("failed to open database at {path}: {source}")]
    ConnectionFailed {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    /// Invalid file path for SQLite database
    #[error("invalid sqlite path: {0}")]
    InvalidPath(PathBuf),

    /// I/O error during database operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx error during query execution
    #[error("database query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Group not found
    #[error("group '{group}' not found")]
    GroupNotFound { group: String },

    /// Spawn blocking task panicked
    #[error("background task panicked: {0}")]
    TaskPanicked(String),
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;

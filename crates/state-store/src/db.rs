//! Database initialization, migration, and connection management.

use std::{
    env,
    path::{Path, PathBuf},
};

use gate_types::state::DbHandle;
use sqlx::{SqlitePool, migrate::Migrator, sqlite::SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use url::Url;

use crate::DbResult;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DB_ENV: &str = "GATEHOUSE_DB_URL";
const DEFAULT_DB_FILE: &str = "gatehouse.db";

static SERVER_DB: OnceCell<DbHandle> = OnceCell::const_new();

/// Return a human-friendly string describing where the server DB will live.
/// Prefers a filesystem path when available, otherwise returns the configured URL.
pub fn display_db_path() -> String {
    if let Ok(val) = env::var(DB_ENV) {
        return val;
    }
    default_db_path().display().to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_FILE)
}

fn sqlite_url_from_path(path: &Path) -> DbResult<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    let url = Url::from_file_path(&absolute).map_err(|_| crate::DbError::InvalidPath(absolute.clone()))?;
    let mut url_string: String = url.into();
    url_string.replace_range(..4, "sqlite");
    Ok(url_string)
}

async fn connect_file_db(path: &Path, max_connections: u32) -> DbResult<DbHandle> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    // SQLx/SQLite can fail to create the file on some platforms unless it
    // exists already. Create it explicitly with 0600 permissions when possible.
    let existed = tokio::fs::try_exists(path).await.unwrap_or(false);
    if !existed {
        warn!(path = %path.display(), "state database not found; creating a new file");
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                let mut options = std::fs::OpenOptions::new();
                options.create_new(true).write(true).mode(0o600);
                let _ = options.open(&path);
            }
            #[cfg(not(unix))]
            {
                let _ = std::fs::OpenOptions::new().create(true).write(true).open(&path);
            }
        })
        .await
        .map_err(|e| crate::DbError::TaskPanicked(e.to_string()))?;
    }

    let url = sqlite_url_from_path(path)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .map_err(|e| crate::DbError::ConnectionFailed {
            path: url.clone(),
            source: e,
        })?;

    Ok(DbHandle {
        pool,
        url,
        path: Some(path.to_path_buf()),
        freshly_created: !existed,
    })
}

async fn connect_db() -> DbResult<DbHandle> {
    if let Ok(url) = env::var(DB_ENV) {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(&url)
            .await
            .map_err(|e| crate::DbError::ConnectionFailed {
                path: url.clone(),
                source: e,
            })?;
        return Ok(DbHandle {
            pool,
            url,
            path: None,
            freshly_created: false,
        });
    }
    connect_file_db(&default_db_path(), 16).await
}

/// Open (once per process) the server state database.
pub async fn server_db() -> DbResult<DbHandle> {
    let handle = SERVER_DB.get_or_try_init(connect_db).await?;
    Ok(handle.clone())
}

/// Apply embedded migrations to the given pool.
pub async fn migrate(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!("state database migrations applied");
    Ok(())
}

/// Current wall-clock time as epoch milliseconds, the timestamp convention
/// used across all tables.
pub(crate) fn current_ts() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_db_is_created_with_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("gatehouse.db");

        let handle = connect_file_db(&path, 2).await.unwrap();
        assert!(handle.freshly_created);
        assert_eq!(handle.path.as_deref(), Some(path.as_path()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        migrate(&handle.pool).await.unwrap();

        // Reopening the same file is not a fresh creation.
        let handle = connect_file_db(&path, 2).await.unwrap();
        assert!(!handle.freshly_created);
    }
}

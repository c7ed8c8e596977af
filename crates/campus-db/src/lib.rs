pub mod accounts;
pub mod catalog;
pub mod migrations;
pub mod models;
pub mod resets;
pub mod search;
pub mod sessions;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Errors callers branch on. Everything else travels as a plain `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A UNIQUE index rejected the write; carries `table.column`.
    #[error("unique constraint failed: {0}")]
    Unique(String),
    #[error("course {0} not found")]
    CourseNotFound(i64),
}

impl DbError {
    /// Column name of a uniqueness conflict, without the table prefix.
    pub fn unique_column(&self) -> Option<&str> {
        match self {
            Self::Unique(col) => Some(col.rsplit('.').next().unwrap_or(col)),
            _ => None,
        }
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Exclusive access for multi-statement writes that need a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// Turn a UNIQUE violation into `DbError::Unique`; pass everything else through.
pub(crate) fn map_unique(err: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(ref e, Some(ref msg)) = err {
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            if let Some(col) = msg.strip_prefix("UNIQUE constraint failed: ") {
                return DbError::Unique(col.to_string()).into();
            }
        }
    }
    err.into()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// SQLite `datetime` text form, so stored timestamps compare lexically.
pub fn sqlite_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

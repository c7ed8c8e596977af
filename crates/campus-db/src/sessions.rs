use anyhow::Result;
use rusqlite::params;

use crate::models::SessionRow;
use crate::{Database, OptionalExt};

impl Database {
    // -- Sessions --

    pub fn create_session(
        &self,
        id: &str,
        scope: &str,
        account_id: &str,
        csrf_token: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, scope, account_id, csrf_token, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, scope, account_id, csrf_token, expires_at],
            )?;
            Ok(())
        })
    }

    /// Live session by id; expired rows are treated as absent.
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, scope, account_id, csrf_token, expires_at
                 FROM sessions
                 WHERE id = ?1 AND expires_at > datetime('now')",
                [id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        scope: row.get(1)?,
                        account_id: row.get(2)?,
                        csrf_token: row.get(3)?,
                        expires_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])?;
            Ok(n)
        })
    }
}

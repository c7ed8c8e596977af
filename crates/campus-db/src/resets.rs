use anyhow::Result;
use rusqlite::params;

use crate::models::ResetOutcome;
use crate::{Database, OptionalExt};

impl Database {
    // -- Password resets --

    /// Store a token digest for `email`, replacing any earlier ones.
    pub fn replace_password_reset(&self, email: &str, token_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM password_resets WHERE email = ?1", [email])?;
            tx.execute(
                "INSERT INTO password_resets (email, token) VALUES (?1, ?2)",
                params![email, token_hash],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Redeem a token digest in one transaction: set the new password, drop
    /// every token for the email and end the user's sessions. With
    /// `max_age_minutes` set, older tokens count as missing. Nothing changes
    /// unless the outcome is `Reset`.
    pub fn consume_password_reset(
        &self,
        token_hash: &str,
        max_age_minutes: Option<i64>,
        password_hash: &str,
    ) -> Result<ResetOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let email: Option<String> = match max_age_minutes {
                Some(minutes) => tx
                    .query_row(
                        "SELECT email FROM password_resets
                         WHERE token = ?1 AND created_at >= datetime('now', ?2)",
                        params![token_hash, format!("-{} minutes", minutes)],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => tx
                    .query_row("SELECT email FROM password_resets WHERE token = ?1", [token_hash], |row| {
                        row.get(0)
                    })
                    .optional()?,
            };
            let Some(email) = email else {
                return Ok(ResetOutcome::InvalidToken);
            };

            let user_id: Option<String> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", [&email], |row| row.get(0))
                .optional()?;
            let Some(user_id) = user_id else {
                return Ok(ResetOutcome::AccountMissing);
            };

            tx.execute("UPDATE users SET password = ?2 WHERE id = ?1", params![user_id, password_hash])?;
            tx.execute("DELETE FROM password_resets WHERE email = ?1", [&email])?;
            let sessions_revoked =
                tx.execute("DELETE FROM sessions WHERE scope = 'user' AND account_id = ?1", [&user_id])?;
            tx.commit()?;

            Ok(ResetOutcome::Reset { user_id, sessions_revoked })
        })
    }

    pub fn purge_expired_password_resets(&self, max_age_minutes: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM password_resets WHERE created_at < datetime('now', ?1)",
                [format!("-{} minutes", max_age_minutes)],
            )?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::tests::new_user;
    use crate::sqlite_timestamp;
    use chrono::{Duration, Utc};

    fn reset_rows(db: &Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM password_resets", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn new_token_replaces_old_one() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("u1", "alice", "a@example.com"), &[]).unwrap();
        db.replace_password_reset("a@example.com", "first").unwrap();
        db.replace_password_reset("a@example.com", "second").unwrap();
        assert_eq!(reset_rows(&db), 1);

        assert_eq!(db.consume_password_reset("first", None, "h1").unwrap(), ResetOutcome::InvalidToken);
        assert!(matches!(
            db.consume_password_reset("second", None, "h2").unwrap(),
            ResetOutcome::Reset { ref user_id, .. } if user_id == "u1"
        ));
    }

    #[test]
    fn token_is_redeemed_once_and_ends_user_sessions() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("u1", "alice", "a@example.com"), &[]).unwrap();
        let expires = sqlite_timestamp(Utc::now() + Duration::hours(1));
        db.create_session("s1", "user", "u1", "c1", &expires).unwrap();
        db.create_session("s2", "user", "u1", "c2", &expires).unwrap();
        db.replace_password_reset("a@example.com", "digest").unwrap();

        assert_eq!(
            db.consume_password_reset("digest", Some(60), "new-hash").unwrap(),
            ResetOutcome::Reset { user_id: "u1".into(), sessions_revoked: 2 }
        );
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().password, "new-hash");
        assert!(db.get_session("s1").unwrap().is_none());
        assert_eq!(reset_rows(&db), 0);

        assert_eq!(
            db.consume_password_reset("digest", Some(60), "other-hash").unwrap(),
            ResetOutcome::InvalidToken
        );
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().password, "new-hash");
    }

    #[test]
    fn token_for_missing_account_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        db.replace_password_reset("gone@example.com", "digest").unwrap();

        assert_eq!(db.consume_password_reset("digest", None, "h").unwrap(), ResetOutcome::AccountMissing);
        assert_eq!(reset_rows(&db), 1);
    }

    #[test]
    fn stale_tokens_expire_only_when_a_ttl_is_given() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("u1", "alice", "a@example.com"), &[]).unwrap();
        db.replace_password_reset("a@example.com", "digest").unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE password_resets SET created_at = datetime('now', '-2 hours')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.consume_password_reset("digest", Some(60), "h").unwrap(), ResetOutcome::InvalidToken);
        assert_eq!(reset_rows(&db), 1);

        assert_eq!(db.purge_expired_password_resets(60).unwrap(), 1);
        assert_eq!(reset_rows(&db), 0);
    }

    #[test]
    fn stale_token_still_redeems_without_a_ttl() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("u1", "alice", "a@example.com"), &[]).unwrap();
        db.replace_password_reset("a@example.com", "digest").unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE password_resets SET created_at = datetime('now', '-2 days')", [])?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(db.consume_password_reset("digest", None, "h").unwrap(), ResetOutcome::Reset { .. }));
    }
}

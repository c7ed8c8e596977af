use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (accounts, catalogue, resets)");
        conn.execute_batch(
            "
            CREATE TABLE students (
                id          TEXT PRIMARY KEY,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                phone       TEXT NOT NULL,
                streetnr    TEXT NOT NULL,
                postal_code TEXT NOT NULL,
                city        TEXT NOT NULL,
                country     TEXT NOT NULL,
                password    TEXT NOT NULL,
                approved    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                first_name      TEXT NOT NULL,
                last_name       TEXT NOT NULL,
                name            TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                phone           TEXT NOT NULL,
                street_nr       TEXT NOT NULL,
                postal_code     TEXT NOT NULL,
                city            TEXT NOT NULL,
                country         TEXT NOT NULL,
                password        TEXT NOT NULL,
                role_id         INTEGER NOT NULL DEFAULT 2,
                profile_picture TEXT,
                approved        INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE categories (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                name  TEXT NOT NULL UNIQUE
            );

            CREATE TABLE courses (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                name  TEXT NOT NULL UNIQUE
            );

            CREATE TABLE category_course (
                course_id    INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                category_id  INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (course_id, category_id)
            );

            CREATE TABLE course_user (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                course_id   INTEGER NOT NULL REFERENCES courses(id),
                start_year  INTEGER NOT NULL,
                end_year    INTEGER NOT NULL,
                CHECK (end_year >= start_year)
            );

            CREATE INDEX idx_course_user_user ON course_user(user_id);

            CREATE TABLE category_user (
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                category_id  INTEGER NOT NULL REFERENCES categories(id),
                PRIMARY KEY (user_id, category_id)
            );

            CREATE TABLE password_resets (
                email       TEXT NOT NULL,
                token       TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_password_resets_email ON password_resets(email);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (sessions)");
        conn.execute_batch(
            "
            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                scope       TEXT NOT NULL CHECK (scope IN ('student', 'user')),
                account_id  TEXT NOT NULL,
                csrf_token  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_account ON sessions(scope, account_id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

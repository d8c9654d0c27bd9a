use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Idempotent schema setup, run once when the database is opened.
///
/// Timestamp columns hold RFC 3339 UTC text written by the application, so
/// SQL string comparison agrees with chronological order.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            discord_id  TEXT NOT NULL UNIQUE,
            username    TEXT NOT NULL,
            avatar_url  TEXT,
            role        TEXT NOT NULL DEFAULT 'citizen'
                        CHECK (role IN ('citizen', 'minister', 'admin')),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_expires
            ON sessions(expires_at);

        CREATE TABLE IF NOT EXISTS proposals (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            scope       TEXT NOT NULL
                        CHECK (scope IN ('public', 'minister')),
            kind        TEXT NOT NULL
                        CHECK (kind IN ('petition', 'law')),
            title       TEXT NOT NULL,
            description TEXT NOT NULL,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            deadline_at TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'open'
                        CHECK (status IN ('open', 'sent_review', 'rejected')),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_proposals_scope
            ON proposals(scope);
        CREATE INDEX IF NOT EXISTS idx_proposals_deadline
            ON proposals(deadline_at);

        CREATE TABLE IF NOT EXISTS votes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            value       TEXT NOT NULL
                        CHECK (value IN ('for', 'against', 'abstain')),
            created_at  TEXT NOT NULL,
            UNIQUE(proposal_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_proposal
            ON votes(proposal_id);

        CREATE TABLE IF NOT EXISTS registry_entries (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            decision    TEXT NOT NULL
                        CHECK (decision IN ('accepted', 'rejected')),
            reason      TEXT,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_registry_created
            ON registry_entries(created_at DESC);

        CREATE TABLE IF NOT EXISTS notifications (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            type        TEXT NOT NULL,
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            href        TEXT,
            is_read     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, is_read);
        ",
    )?;

    info!("database migrations complete");
    Ok(())
}

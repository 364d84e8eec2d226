use crate::error::Result;

/// Schema version recorded so readers can detect a database written by an
/// older build. Bumped whenever `CREATE_TABLES` changes shape.
pub const SCHEMA_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// Full DDL for the knowledge repository's persisted state.
///
/// All tables use `CREATE TABLE IF NOT EXISTS` so that `run_migrations` is
/// idempotent and safe to call on an already-initialised database.
pub const CREATE_TABLES: &str = "
-- -------------------------------------------------------------------------
-- notes
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notes (
    id                  TEXT    NOT NULL PRIMARY KEY,
    title               TEXT    NOT NULL,
    tags                TEXT    NOT NULL DEFAULT '[]',
    created_at          TEXT    NOT NULL,
    updated_at          TEXT    NOT NULL,
    current_version_id  TEXT             REFERENCES versions(id) ON DELETE SET NULL
);

-- -------------------------------------------------------------------------
-- drafts
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS drafts (
    note_id      TEXT NOT NULL PRIMARY KEY REFERENCES notes(id) ON DELETE CASCADE,
    body_md      TEXT NOT NULL,
    tags         TEXT NOT NULL DEFAULT '[]',
    autosave_ts  TEXT NOT NULL
);

-- -------------------------------------------------------------------------
-- versions
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS versions (
    id                 TEXT NOT NULL PRIMARY KEY,
    note_id            TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    body_md            TEXT NOT NULL,
    tags               TEXT NOT NULL DEFAULT '[]',
    content_hash       TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    parent_version_id  TEXT          REFERENCES versions(id) ON DELETE SET NULL,
    label              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_note_id
    ON versions (note_id, created_at);

-- -------------------------------------------------------------------------
-- collections
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS collections (
    id           TEXT NOT NULL PRIMARY KEY,
    name         TEXT NOT NULL,
    name_key     TEXT NOT NULL,
    description  TEXT,
    created_at   TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_collections_name_key
    ON collections (name_key);

-- -------------------------------------------------------------------------
-- publications
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS publications (
    id            TEXT NOT NULL PRIMARY KEY,
    note_id       TEXT NOT NULL REFERENCES notes(id)    ON DELETE CASCADE,
    version_id    TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
    published_at  TEXT NOT NULL,
    label         TEXT
);

CREATE INDEX IF NOT EXISTS idx_publications_version_id
    ON publications (version_id);

-- -------------------------------------------------------------------------
-- publication_collections (bridge table)
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS publication_collections (
    publication_id  TEXT NOT NULL REFERENCES publications(id) ON DELETE CASCADE,
    collection_id   TEXT NOT NULL REFERENCES collections(id)  ON DELETE CASCADE,
    PRIMARY KEY (publication_id, collection_id)
);

-- -------------------------------------------------------------------------
-- idempotency_tokens
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS idempotency_tokens (
    note_id       TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    client_token  TEXT NOT NULL,
    version_id    TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
    recorded_at   TEXT NOT NULL,
    PRIMARY KEY (note_id, client_token)
);

-- -------------------------------------------------------------------------
-- visibility_events
-- -------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS visibility_events (
    id             TEXT    NOT NULL PRIMARY KEY,
    version_id     TEXT    NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
    note_id        TEXT    NOT NULL REFERENCES notes(id)    ON DELETE CASCADE,
    op             TEXT    NOT NULL,
    collection_ids TEXT    NOT NULL DEFAULT '[]',
    submitted_at   TEXT    NOT NULL,
    stage          TEXT    NOT NULL DEFAULT 'queued',
    attempts       INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_visibility_events_note_id
    ON visibility_events (note_id, submitted_at);

CREATE INDEX IF NOT EXISTS idx_visibility_events_version_id
    ON visibility_events (version_id);
";

// ---------------------------------------------------------------------------
// Migration runner
// ---------------------------------------------------------------------------

/// Initialise (or upgrade) the database schema.
///
/// This function is **idempotent**: it is safe to call on a database that
/// has already been initialised.
///
/// Steps performed:
/// 1. Enable WAL journal mode for better concurrent read performance.
/// 2. Enable foreign-key enforcement.
/// 3. Execute the full `CREATE TABLE / INDEX IF NOT EXISTS` DDL.
pub fn run_migrations(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn open_memory() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = open_memory();
        run_migrations(&conn).expect("first migration");
        run_migrations(&conn).expect("second migration");
    }

    #[test]
    fn all_tables_exist_after_migration() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        let expected = [
            "notes",
            "drafts",
            "versions",
            "collections",
            "publications",
            "publication_collections",
            "idempotency_tokens",
            "visibility_events",
        ];

        for table in &expected {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    rusqlite::params![table],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            assert_eq!(count, 1, "table '{table}' should exist");
        }
    }

    #[test]
    fn collection_name_key_is_unique() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO collections (id, name, name_key, description, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
            rusqlite::params!["col_1", "Research", "research", "2024-01-01T00:00:00Z"],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO collections (id, name, name_key, description, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
            rusqlite::params!["col_2", "RESEARCH", "research", "2024-01-01T00:00:00Z"],
        );
        assert!(result.is_err(), "case-differing duplicate name must be rejected");
    }

    #[test]
    fn wal_mode_is_active() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        let _mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
    }
}

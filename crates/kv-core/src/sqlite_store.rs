use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::{Collection, Draft, Note, Publication, Version, VersionLabel};
use crate::schema::run_migrations;
use crate::store::{Page, Store};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open (or create) a file-backed, WAL-mode SQLite pool and run migrations.
pub fn create_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder()
        .max_size(16)
        .build(manager)
        .map_err(|e| Error::StorageIo(e.to_string()))?;
    let conn = pool.get().map_err(|e| Error::StorageIo(e.to_string()))?;
    configure_connection(&conn)?;
    run_migrations(&conn)?;
    Ok(pool)
}

/// Open an in-memory pool for tests. Capped at one connection: SQLite's
/// `:memory:` database is private per connection, so a pool with more than
/// one slot would silently hand different callers different, empty
/// databases.
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::StorageIo(e.to_string()))?;
    let conn = pool.get().map_err(|e| Error::StorageIo(e.to_string()))?;
    configure_connection(&conn)?;
    run_migrations(&conn)?;
    Ok(pool)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// The persistent, authoritative `Store` implementation.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn open_file(db_path: &str) -> Result<Self> {
        Ok(Self::new(create_pool(db_path)?))
    }

    pub fn open_memory() -> Result<Self> {
        Ok(Self::new(create_memory_pool()?))
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| Error::StorageIo(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get("id")?,
        title: row.get("title")?,
        tags: parse_tags(&row.get::<_, String>("tags")?),
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
        current_version_id: row.get("current_version_id")?,
    })
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<Draft> {
    Ok(Draft {
        note_id: row.get("note_id")?,
        body_md: row.get("body_md")?,
        tags: parse_tags(&row.get::<_, String>("tags")?),
        autosave_ts: parse_ts(&row.get::<_, String>("autosave_ts")?),
    })
}

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<Version> {
    let label_str: String = row.get("label")?;
    Ok(Version {
        id: row.get("id")?,
        note_id: row.get("note_id")?,
        body_md: row.get("body_md")?,
        tags: parse_tags(&row.get::<_, String>("tags")?),
        content_hash: row.get("content_hash")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        parent_version_id: row.get("parent_version_id")?,
        label: if label_str == "major" {
            VersionLabel::Major
        } else {
            VersionLabel::Minor
        },
    })
}

fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

fn label_to_str(label: VersionLabel) -> &'static str {
    match label {
        VersionLabel::Major => "major",
        VersionLabel::Minor => "minor",
    }
}

impl Store for SqliteStore {
    fn create_note(&self, title: &str, tags: Vec<String>) -> Result<Note> {
        let note = Note::new(title, tags);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notes (id, title, tags, created_at, updated_at, current_version_id)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                note.id,
                note.title,
                serde_json::to_string(&note.tags)?,
                note.created_at.to_rfc3339(),
                note.updated_at.to_rfc3339(),
            ],
        )?;
        tracing::debug!(note_id = %note.id, "note created");
        Ok(note)
    }

    fn get_note(&self, note_id: &str) -> Result<Note> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, tags, created_at, updated_at, current_version_id FROM notes WHERE id = ?1",
            params![note_id],
            row_to_note,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("note", note_id))
    }

    fn list_notes(&self, page: usize, page_size: usize) -> Result<Page<Note>> {
        let conn = self.conn()?;
        let total_count: usize = conn.query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?;
        let mut stmt = conn.prepare(
            "SELECT id, title, tags, created_at, updated_at, current_version_id
             FROM notes ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let items = stmt
            .query_map(params![page_size as i64, (page * page_size) as i64], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page { items, total_count })
    }

    fn update_note(&self, note: &Note) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notes SET title = ?1, tags = ?2, updated_at = ?3, current_version_id = ?4 WHERE id = ?5",
            params![
                note.title,
                serde_json::to_string(&note.tags)?,
                note.updated_at.to_rfc3339(),
                note.current_version_id,
                note.id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("note", &note.id));
        }
        Ok(())
    }

    fn delete_note(&self, note_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM notes WHERE id = ?1", params![note_id])?;
        Ok(())
    }

    fn save_draft(&self, note_id: &str, body_md: &str, tags: Vec<String>) -> Result<Draft> {
        let draft = Draft {
            note_id: note_id.to_string(),
            body_md: body_md.to_string(),
            tags,
            autosave_ts: Utc::now(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO drafts (note_id, body_md, tags, autosave_ts) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(note_id) DO UPDATE SET body_md = ?2, tags = ?3, autosave_ts = ?4",
            params![
                draft.note_id,
                draft.body_md,
                serde_json::to_string(&draft.tags)?,
                draft.autosave_ts.to_rfc3339(),
            ],
        )?;
        Ok(draft)
    }

    fn get_draft(&self, note_id: &str) -> Result<Draft> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT note_id, body_md, tags, autosave_ts FROM drafts WHERE note_id = ?1",
            params![note_id],
            row_to_draft,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("draft", note_id))
    }

    fn has_draft(&self, note_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM drafts WHERE note_id = ?1",
            params![note_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn delete_draft(&self, note_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM drafts WHERE note_id = ?1", params![note_id])?;
        Ok(())
    }

    fn create_version(&self, version: &Version) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO versions (id, note_id, body_md, tags, content_hash, created_at, parent_version_id, label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                version.id,
                version.note_id,
                version.body_md,
                serde_json::to_string(&version.tags)?,
                version.content_hash,
                version.created_at.to_rfc3339(),
                version.parent_version_id,
                label_to_str(version.label),
            ],
        )?;
        Ok(())
    }

    fn get_version(&self, version_id: &str) -> Result<Version> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, note_id, body_md, tags, content_hash, created_at, parent_version_id, label
             FROM versions WHERE id = ?1",
            params![version_id],
            row_to_version,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("version", version_id))
    }

    fn list_versions(&self, note_id: &str, page: usize, page_size: usize) -> Result<Page<Version>> {
        let conn = self.conn()?;
        let total_count: usize = conn.query_row(
            "SELECT COUNT(*) FROM versions WHERE note_id = ?1",
            params![note_id],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT id, note_id, body_md, tags, content_hash, created_at, parent_version_id, label
             FROM versions WHERE note_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let items = stmt
            .query_map(
                params![note_id, page_size as i64, (page * page_size) as i64],
                row_to_version,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page { items, total_count })
    }

    fn create_collection(&self, name: &str, description: Option<String>) -> Result<Collection> {
        crate::model::validate_collection_name(name)?;
        let collection = Collection::new(name, description);
        let key = Collection::name_key(name);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO collections (id, name, name_key, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                collection.id,
                collection.name,
                key,
                collection.description,
                collection.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                Error::Conflict(format!("collection name '{name}' already exists"))
            }
            other => Error::Database(other),
        })?;
        Ok(collection)
    }

    fn get_collection(&self, collection_id: &str) -> Result<Collection> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, description, created_at FROM collections WHERE id = ?1",
            params![collection_id],
            row_to_collection,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("collection", collection_id))
    }

    fn list_collections(&self) -> Result<Vec<Collection>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, description, created_at FROM collections ORDER BY name")?;
        let items = stmt
            .query_map([], row_to_collection)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn lookup_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
        let key = Collection::name_key(name);
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, description, created_at FROM collections WHERE name_key = ?1",
            params![key],
            row_to_collection,
        )
        .optional()
        .map_err(Error::Database)
    }

    fn publish(
        &self,
        version: &Version,
        collection_ids: &[String],
        label: Option<VersionLabel>,
    ) -> Result<Publication> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO versions (id, note_id, body_md, tags, content_hash, created_at, parent_version_id, label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                version.id,
                version.note_id,
                version.body_md,
                serde_json::to_string(&version.tags)?,
                version.content_hash,
                version.created_at.to_rfc3339(),
                version.parent_version_id,
                label_to_str(version.label),
            ],
        )?;

        let updated = tx.execute(
            "UPDATE notes SET current_version_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![version.id, version.created_at.to_rfc3339(), version.note_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("note", &version.note_id));
        }

        let publication = Publication::new(&version.note_id, &version.id, collection_ids.to_vec(), label);
        tx.execute(
            "INSERT INTO publications (id, note_id, version_id, published_at, label) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                publication.id,
                publication.note_id,
                publication.version_id,
                publication.published_at.to_rfc3339(),
                publication.label.map(label_to_str),
            ],
        )?;
        for collection_id in collection_ids {
            tx.execute(
                "INSERT INTO publication_collections (publication_id, collection_id) VALUES (?1, ?2)",
                params![publication.id, collection_id],
            )?;
        }

        tx.execute("DELETE FROM drafts WHERE note_id = ?1", params![version.note_id])?;

        tx.commit()?;
        tracing::debug!(version_id = %version.id, note_id = %version.note_id, "version published");
        Ok(publication)
    }

    fn latest_publication(&self, note_id: &str) -> Result<Option<Publication>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, note_id, version_id, published_at, label FROM publications
                 WHERE note_id = ?1 ORDER BY published_at DESC LIMIT 1",
                params![note_id],
                |row| {
                    let label_str: Option<String> = row.get("label")?;
                    Ok((
                        row.get::<_, String>("id")?,
                        row.get::<_, String>("note_id")?,
                        row.get::<_, String>("version_id")?,
                        row.get::<_, String>("published_at")?,
                        label_str,
                    ))
                },
            )
            .optional()?;

        let Some((id, note_id, version_id, published_at, label_str)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT collection_id FROM publication_collections WHERE publication_id = ?1")?;
        let collection_ids = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Publication {
            id,
            note_id,
            version_id,
            collection_ids,
            published_at: parse_ts(&published_at),
            label: label_str.map(|s| if s == "major" { VersionLabel::Major } else { VersionLabel::Minor }),
        }))
    }

    fn lookup_idempotency_token(&self, note_id: &str, client_token: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT version_id FROM idempotency_tokens WHERE note_id = ?1 AND client_token = ?2",
            params![note_id, client_token],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::Database)
    }

    fn record_idempotency_token(&self, note_id: &str, client_token: &str, version_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO idempotency_tokens (note_id, client_token, version_id, recorded_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(note_id, client_token) DO NOTHING",
            params![note_id, client_token, version_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;

    fn store() -> SqliteStore {
        SqliteStore::open_memory().expect("in-memory store")
    }

    #[test]
    fn create_and_get_note_roundtrips() {
        let store = store();
        let note = store.create_note("Title", vec!["a".into()]).unwrap();
        let fetched = store.get_note(&note.id).unwrap();
        assert_eq!(fetched.title, "Title");
        assert_eq!(fetched.tags, vec!["a".to_string()]);
    }

    #[test]
    fn get_missing_note_errors() {
        let store = store();
        assert!(matches!(store.get_note("note_missing"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn at_most_one_draft_per_note() {
        contract_tests::at_most_one_draft_per_note(&store());
    }

    #[test]
    fn collection_names_are_case_insensitively_unique() {
        contract_tests::collection_names_are_case_insensitively_unique(&store());
    }

    #[test]
    fn collection_name_rejects_reserved_words() {
        contract_tests::collection_name_rejects_reserved_words(&store());
    }

    #[test]
    fn collection_name_rejects_over_length() {
        contract_tests::collection_name_rejects_over_length(&store());
    }

    #[test]
    fn publish_creates_a_real_version() {
        contract_tests::publish_creates_a_real_version(&store());
    }

    #[test]
    fn publish_consumes_the_draft() {
        let store = store();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "body", vec![]).unwrap();
        let version = Version::new(&note.id, "body", vec![], "hash", None, VersionLabel::Minor);
        store.publish(&version, &["col_1".into()], None).unwrap();
        assert!(!store.has_draft(&note.id).unwrap());
    }

    #[test]
    fn publish_updates_current_version_id() {
        let store = store();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "body", vec![]).unwrap();
        let version = Version::new(&note.id, "body", vec![], "hash", None, VersionLabel::Minor);
        store.publish(&version, &["col_1".into()], None).unwrap();
        let refreshed = store.get_note(&note.id).unwrap();
        assert_eq!(refreshed.current_version_id, Some(version.id));
    }

    #[test]
    fn idempotency_token_roundtrips() {
        let store = store();
        let note = store.create_note("Title", vec![]).unwrap();
        assert!(store.lookup_idempotency_token(&note.id, "t1").unwrap().is_none());
        store.record_idempotency_token(&note.id, "t1", "ver_abc").unwrap();
        assert_eq!(
            store.lookup_idempotency_token(&note.id, "t1").unwrap(),
            Some("ver_abc".to_string())
        );
    }

    #[test]
    fn latest_publication_returns_the_most_recent_one() {
        let store = store();
        let note = store.create_note("Title", vec![]).unwrap();
        let v1 = Version::new(&note.id, "v1", vec![], "h1", None, VersionLabel::Minor);
        store.publish(&v1, &["col_1".into()], None).unwrap();
        let v2 = Version::new(&note.id, "v2", vec![], "h2", None, VersionLabel::Minor);
        store.publish(&v2, &["col_2".into()], None).unwrap();

        let latest = store.latest_publication(&note.id).unwrap().unwrap();
        assert_eq!(latest.version_id, v2.id);
        assert_eq!(latest.collection_ids, vec!["col_2".to_string()]);
    }

    #[test]
    fn list_versions_orders_newest_first() {
        let store = store();
        let note = store.create_note("Title", vec![]).unwrap();
        for body in ["Alpha", "Beta", "Gamma"] {
            store.save_draft(&note.id, body, vec![]).unwrap();
            let version = Version::new(&note.id, body, vec![], body, None, VersionLabel::Minor);
            store.publish(&version, &["col_1".into()], None).unwrap();
        }
        let page = store.list_versions(&note.id, 0, 10).unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.items[0].body_md, "Gamma");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication label: whether a Version is a routine edit or a deliberate
/// milestone (rollbacks are always `Major`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionLabel {
    Minor,
    Major,
}

impl Default for VersionLabel {
    fn default() -> Self {
        VersionLabel::Minor
    }
}

/// A Note's mutable working copy. Owned one-to-one by a Note, never
/// searchable, and replaced wholesale on every autosave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub note_id: String,
    pub body_md: String,
    pub tags: Vec<String>,
    pub autosave_ts: DateTime<Utc>,
}

/// A Note: the durable container for a Draft and its published history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_version_id: Option<String>,
}

impl Note {
    pub fn new(title: impl Into<String>, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::ids::note_id(),
            title: title.into(),
            tags,
            created_at: now,
            updated_at: now,
            current_version_id: None,
        }
    }
}

/// An immutable, content-addressed snapshot of a Note's body at publish
/// time. Versions are never mutated after creation; rollback always
/// produces a new Version rather than rewriting an old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub note_id: String,
    pub body_md: String,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub parent_version_id: Option<String>,
    pub label: VersionLabel,
}

impl Version {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        note_id: impl Into<String>,
        body_md: impl Into<String>,
        tags: Vec<String>,
        content_hash: impl Into<String>,
        parent_version_id: Option<String>,
        label: VersionLabel,
    ) -> Self {
        Self {
            id: crate::ids::version_id(),
            note_id: note_id.into(),
            body_md: body_md.into(),
            tags,
            content_hash: content_hash.into(),
            created_at: Utc::now(),
            parent_version_id,
            label,
        }
    }
}

/// A named grouping that Notes are published into. Name uniqueness is
/// case-insensitive; `Store` implementations enforce this by keying on a
/// lower-cased form of `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: crate::ids::collection_id(),
            name: name.into(),
            description,
            created_at: Utc::now(),
        }
    }

    /// Case-insensitive uniqueness key. See Open Question (c): the source
    /// system tolerated case-differing duplicates despite documenting
    /// case-insensitive uniqueness; this implementation always compares on
    /// this key, both at creation and at rename.
    pub fn name_key(name: &str) -> String {
        name.to_lowercase()
    }
}

/// Names no Collection may take, reserved for future built-in scopes. See
/// DESIGN.md's Open Questions for why this particular set was chosen.
pub const RESERVED_COLLECTION_NAMES: &[&str] = &["all", "none", "default", "drafts", "trash"];

const MAX_COLLECTION_NAME_LEN: usize = 100;

/// Shared length/reserved-name validation used by every `Store::create_collection`
/// implementation, so the two adapters can't drift on this invariant.
pub fn validate_collection_name(name: &str) -> crate::error::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::error::Error::validation(["collection name must not be empty"]));
    }
    if name.chars().count() > MAX_COLLECTION_NAME_LEN {
        return Err(crate::error::Error::validation([format!(
            "collection name exceeds {MAX_COLLECTION_NAME_LEN} characters"
        )]));
    }
    if RESERVED_COLLECTION_NAMES.contains(&Collection::name_key(name).as_str()) {
        return Err(crate::error::Error::validation([format!(
            "collection name '{name}' is reserved"
        )]));
    }
    Ok(())
}

/// Record of a single Publish: which Version went into which Collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub note_id: String,
    pub version_id: String,
    pub collection_ids: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub label: Option<VersionLabel>,
}

impl Publication {
    pub fn new(
        note_id: impl Into<String>,
        version_id: impl Into<String>,
        collection_ids: Vec<String>,
        label: Option<VersionLabel>,
    ) -> Self {
        Self {
            id: crate::ids::publication_id(),
            note_id: note_id.into(),
            version_id: version_id.into(),
            collection_ids,
            published_at: Utc::now(),
            label,
        }
    }
}

/// The operation a `VisibilityEvent` asks the scheduler to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityOp {
    Publish,
    Republish,
    Rollback,
}

/// Intent to reflect a newly published Version in the search index. Emitted
/// by the Publish Coordinator, consumed by the Visibility Scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityEvent {
    pub id: String,
    pub version_id: String,
    pub note_id: String,
    pub op: VisibilityOp,
    pub collection_ids: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl VisibilityEvent {
    pub fn new(
        version_id: impl Into<String>,
        note_id: impl Into<String>,
        op: VisibilityOp,
        collection_ids: Vec<String>,
    ) -> Self {
        Self {
            id: crate::ids::event_id(),
            version_id: version_id.into(),
            note_id: note_id.into(),
            op,
            collection_ids,
            submitted_at: Utc::now(),
        }
    }
}

/// Record of a previously-seen `client_token`, used to make Publish and
/// Rollback idempotent. Scoped per note, retained for at least 24h by
/// convention of the Store implementation (see `Store::idempotency_ttl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub note_id: String,
    pub client_token: String,
    pub version_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_new_has_no_current_version() {
        let note = Note::new("Title", vec!["tag1".to_string()]);
        assert!(note.current_version_id.is_none());
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn version_new_has_unique_id() {
        let v1 = Version::new("note_1", "body", vec![], "hash", None, VersionLabel::Minor);
        let v2 = Version::new("note_1", "body", vec![], "hash", None, VersionLabel::Minor);
        assert_ne!(v1.id, v2.id);
    }

    #[test]
    fn collection_name_key_lowercases() {
        assert_eq!(Collection::name_key("Research"), "research");
        assert_eq!(Collection::name_key("RESEARCH"), "research");
    }

    #[test]
    fn version_label_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&VersionLabel::Major).unwrap(),
            "\"major\""
        );
    }

    #[test]
    fn visibility_event_roundtrips_json() {
        let ev = VisibilityEvent::new("ver_1", "note_1", VisibilityOp::Publish, vec!["col_1".into()]);
        let json = serde_json::to_string(&ev).unwrap();
        let back: VisibilityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev.id, back.id);
        assert_eq!(back.op, VisibilityOp::Publish);
    }
}

use crate::error::Result;
use crate::model::{Collection, Draft, Note, Publication, Version, VersionLabel};

/// A page of results plus the total row count the page was drawn from.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

/// Everything the core pipeline needs from persistence.
///
/// All mutating operations are transactional: either the full set of row
/// changes they describe is visible, or none of it is. Implementations are
/// `Send + Sync` so a single `Store` can be shared across the scheduler's
/// worker pool behind an `Arc`.
pub trait Store: Send + Sync {
    // -- Notes ---------------------------------------------------------
    fn create_note(&self, title: &str, tags: Vec<String>) -> Result<Note>;
    fn get_note(&self, note_id: &str) -> Result<Note>;
    fn list_notes(&self, page: usize, page_size: usize) -> Result<Page<Note>>;
    fn update_note(&self, note: &Note) -> Result<()>;
    fn delete_note(&self, note_id: &str) -> Result<()>;

    // -- Drafts ----------------------------------------------------------
    fn save_draft(&self, note_id: &str, body_md: &str, tags: Vec<String>) -> Result<Draft>;
    fn get_draft(&self, note_id: &str) -> Result<Draft>;
    fn has_draft(&self, note_id: &str) -> Result<bool>;
    fn delete_draft(&self, note_id: &str) -> Result<()>;

    // -- Versions ----------------------------------------------------------
    fn create_version(&self, version: &Version) -> Result<()>;
    fn get_version(&self, version_id: &str) -> Result<Version>;
    fn list_versions(&self, note_id: &str, page: usize, page_size: usize) -> Result<Page<Version>>;

    // -- Collections ---------------------------------------------------------
    fn create_collection(&self, name: &str, description: Option<String>) -> Result<Collection>;
    fn get_collection(&self, collection_id: &str) -> Result<Collection>;
    fn list_collections(&self) -> Result<Vec<Collection>>;
    fn lookup_collection_by_name(&self, name: &str) -> Result<Option<Collection>>;

    // -- Publications ---------------------------------------------------------
    /// Validate and persist a Publish/Rollback atomically: creates `version`,
    /// updates the owning Note's `current_version_id`, and records a
    /// `Publication` linking it to `collection_ids`. Returns the created
    /// `Publication`.
    fn publish(&self, version: &Version, collection_ids: &[String], label: Option<VersionLabel>) -> Result<Publication>;

    /// Most recent `Publication` for `note_id`, if any have been made yet.
    /// Used by Rollback to carry forward the collections a note is
    /// currently published into when the caller doesn't name new ones.
    fn latest_publication(&self, note_id: &str) -> Result<Option<Publication>>;

    // -- Idempotency ---------------------------------------------------------
    /// Look up a prior Publish/Rollback result by `client_token`, scoped to
    /// `note_id`. Returns `None` if this token has not been seen for this
    /// note.
    fn lookup_idempotency_token(&self, note_id: &str, client_token: &str) -> Result<Option<String>>;
    fn record_idempotency_token(&self, note_id: &str, client_token: &str, version_id: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod contract_tests {
    //! Shared behavioral assertions run against every `Store` implementation.
    //! Each `Store` impl's own test module calls these with its own fixture.
    use super::*;

    pub fn at_most_one_draft_per_note(store: &dyn Store) {
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "first", vec![]).unwrap();
        store.save_draft(&note.id, "second", vec![]).unwrap();
        let draft = store.get_draft(&note.id).unwrap();
        assert_eq!(draft.body_md, "second");
    }

    pub fn collection_names_are_case_insensitively_unique(store: &dyn Store) {
        store.create_collection("Research", None).unwrap();
        let err = store.create_collection("RESEARCH", None);
        assert!(err.is_err(), "case-differing duplicate collection name must be rejected");
    }

    pub fn collection_name_rejects_reserved_words(store: &dyn Store) {
        let err = store.create_collection("Default", None);
        assert!(err.is_err(), "reserved collection name must be rejected regardless of case");
    }

    pub fn collection_name_rejects_over_length(store: &dyn Store) {
        let name: String = std::iter::repeat('a').take(101).collect();
        let err = store.create_collection(&name, None);
        assert!(err.is_err(), "collection name over 100 chars must be rejected");
    }

    pub fn publish_creates_a_real_version(store: &dyn Store) {
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "body", vec![]).unwrap();
        let col = store.create_collection("Research", None).unwrap();
        let version = Version::new(&note.id, "body", vec![], "hash", None, VersionLabel::Minor);
        let publication = store
            .publish(&version, &[col.id.clone()], None)
            .unwrap();
        assert_eq!(publication.version_id, version.id);
        let fetched = store.get_version(&version.id).unwrap();
        assert_eq!(fetched.body_md, "body");
    }
}

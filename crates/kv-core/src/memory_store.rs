use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{Collection, Draft, Note, Publication, Version, VersionLabel};
use crate::store::{Page, Store};

#[derive(Default)]
struct Tables {
    notes: HashMap<String, Note>,
    drafts: HashMap<String, Draft>,
    versions: HashMap<String, Version>,
    collections: HashMap<String, Collection>,
    publications: HashMap<String, Publication>,
    idempotency: HashMap<(String, String), String>,
}

/// A `Store` backed entirely by in-process `HashMap`s. Used for tests and for
/// `kv-cli` ephemeral/scratch sessions; never durable across process
/// restarts. Implements the exact same contract as `SqliteStore` — notably,
/// `publish` here constructs and retains a real `Version`, never a
/// placeholder id.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn create_note(&self, title: &str, tags: Vec<String>) -> Result<Note> {
        let note = Note::new(title, tags);
        let mut tables = self.tables.lock().unwrap();
        tables.notes.insert(note.id.clone(), note.clone());
        Ok(note)
    }

    fn get_note(&self, note_id: &str) -> Result<Note> {
        let tables = self.tables.lock().unwrap();
        tables
            .notes
            .get(note_id)
            .cloned()
            .ok_or_else(|| Error::not_found("note", note_id))
    }

    fn list_notes(&self, page: usize, page_size: usize) -> Result<Page<Note>> {
        let tables = self.tables.lock().unwrap();
        let mut all: Vec<Note> = tables.notes.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total_count = all.len();
        let items = all.into_iter().skip(page * page_size).take(page_size).collect();
        Ok(Page { items, total_count })
    }

    fn update_note(&self, note: &Note) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.notes.contains_key(&note.id) {
            return Err(Error::not_found("note", &note.id));
        }
        tables.notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    fn delete_note(&self, note_id: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.notes.remove(note_id);
        tables.drafts.remove(note_id);
        Ok(())
    }

    fn save_draft(&self, note_id: &str, body_md: &str, tags: Vec<String>) -> Result<Draft> {
        let draft = Draft {
            note_id: note_id.to_string(),
            body_md: body_md.to_string(),
            tags,
            autosave_ts: chrono::Utc::now(),
        };
        let mut tables = self.tables.lock().unwrap();
        tables.drafts.insert(note_id.to_string(), draft.clone());
        Ok(draft)
    }

    fn get_draft(&self, note_id: &str) -> Result<Draft> {
        let tables = self.tables.lock().unwrap();
        tables
            .drafts
            .get(note_id)
            .cloned()
            .ok_or_else(|| Error::not_found("draft", note_id))
    }

    fn has_draft(&self, note_id: &str) -> Result<bool> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.drafts.contains_key(note_id))
    }

    fn delete_draft(&self, note_id: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.drafts.remove(note_id);
        Ok(())
    }

    fn create_version(&self, version: &Version) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.versions.insert(version.id.clone(), version.clone());
        Ok(())
    }

    fn get_version(&self, version_id: &str) -> Result<Version> {
        let tables = self.tables.lock().unwrap();
        tables
            .versions
            .get(version_id)
            .cloned()
            .ok_or_else(|| Error::not_found("version", version_id))
    }

    fn list_versions(&self, note_id: &str, page: usize, page_size: usize) -> Result<Page<Version>> {
        let tables = self.tables.lock().unwrap();
        let mut all: Vec<Version> = tables
            .versions
            .values()
            .filter(|v| v.note_id == note_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total_count = all.len();
        let items = all.into_iter().skip(page * page_size).take(page_size).collect();
        Ok(Page { items, total_count })
    }

    fn create_collection(&self, name: &str, description: Option<String>) -> Result<Collection> {
        crate::model::validate_collection_name(name)?;
        let key = Collection::name_key(name);
        let mut tables = self.tables.lock().unwrap();
        if tables
            .collections
            .values()
            .any(|c| Collection::name_key(&c.name) == key)
        {
            return Err(Error::Conflict(format!("collection name '{name}' already exists")));
        }
        let collection = Collection::new(name, description);
        tables.collections.insert(collection.id.clone(), collection.clone());
        Ok(collection)
    }

    fn get_collection(&self, collection_id: &str) -> Result<Collection> {
        let tables = self.tables.lock().unwrap();
        tables
            .collections
            .get(collection_id)
            .cloned()
            .ok_or_else(|| Error::not_found("collection", collection_id))
    }

    fn list_collections(&self) -> Result<Vec<Collection>> {
        let tables = self.tables.lock().unwrap();
        let mut all: Vec<Collection> = tables.collections.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn lookup_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
        let key = Collection::name_key(name);
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .collections
            .values()
            .find(|c| Collection::name_key(&c.name) == key)
            .cloned())
    }

    fn publish(
        &self,
        version: &Version,
        collection_ids: &[String],
        label: Option<VersionLabel>,
    ) -> Result<Publication> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.notes.contains_key(&version.note_id) {
            return Err(Error::not_found("note", &version.note_id));
        }
        tables.versions.insert(version.id.clone(), version.clone());

        let note = tables.notes.get_mut(&version.note_id).unwrap();
        note.current_version_id = Some(version.id.clone());
        note.updated_at = version.created_at;

        tables.drafts.remove(&version.note_id);

        let publication = Publication::new(
            version.note_id.clone(),
            version.id.clone(),
            collection_ids.to_vec(),
            label,
        );
        tables.publications.insert(publication.id.clone(), publication.clone());
        Ok(publication)
    }

    fn latest_publication(&self, note_id: &str) -> Result<Option<Publication>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .publications
            .values()
            .filter(|p| p.note_id == note_id)
            .max_by_key(|p| p.published_at)
            .cloned())
    }

    fn lookup_idempotency_token(&self, note_id: &str, client_token: &str) -> Result<Option<String>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .idempotency
            .get(&(note_id.to_string(), client_token.to_string()))
            .cloned())
    }

    fn record_idempotency_token(&self, note_id: &str, client_token: &str, version_id: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .idempotency
            .entry((note_id.to_string(), client_token.to_string()))
            .or_insert_with(|| version_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;

    #[test]
    fn at_most_one_draft_per_note() {
        contract_tests::at_most_one_draft_per_note(&InMemoryStore::new());
    }

    #[test]
    fn collection_names_are_case_insensitively_unique() {
        contract_tests::collection_names_are_case_insensitively_unique(&InMemoryStore::new());
    }

    #[test]
    fn collection_name_rejects_reserved_words() {
        contract_tests::collection_name_rejects_reserved_words(&InMemoryStore::new());
    }

    #[test]
    fn collection_name_rejects_over_length() {
        contract_tests::collection_name_rejects_over_length(&InMemoryStore::new());
    }

    #[test]
    fn publish_creates_a_real_version() {
        contract_tests::publish_creates_a_real_version(&InMemoryStore::new());
    }

    #[test]
    fn publish_consumes_the_draft() {
        let store = InMemoryStore::new();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "body", vec![]).unwrap();
        let version = Version::new(&note.id, "body", vec![], "hash", None, VersionLabel::Minor);
        store.publish(&version, &["col_1".into()], None).unwrap();
        assert!(!store.has_draft(&note.id).unwrap());
    }

    #[test]
    fn publish_on_unknown_note_fails() {
        let store = InMemoryStore::new();
        let version = Version::new("note_missing", "body", vec![], "hash", None, VersionLabel::Minor);
        assert!(store.publish(&version, &[], None).is_err());
    }

    #[test]
    fn latest_publication_returns_the_most_recent_one() {
        let store = InMemoryStore::new();
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
    fn idempotency_token_is_recorded_once() {
        let store = InMemoryStore::new();
        let note = store.create_note("Title", vec![]).unwrap();
        store.record_idempotency_token(&note.id, "t1", "ver_a").unwrap();
        store.record_idempotency_token(&note.id, "t1", "ver_b").unwrap();
        assert_eq!(
            store.lookup_idempotency_token(&note.id, "t1").unwrap(),
            Some("ver_a".to_string())
        );
    }
}

//! Publish Coordinator: turns a Draft into a new Version, makes it current,
//! records a Publication, and hands a `VisibilityEvent` to the scheduler.
//! Publish and Rollback share the same validate → snapshot → commit →
//! emit shape, mirroring the teacher's `WorkflowEngine::submit_event` but
//! mediated through [`kv_core::Store`] rather than a raw connection.

use std::sync::Arc;

use kv_core::{Error, Result, Store, Version, VersionLabel, VisibilityEvent, VisibilityOp};

use crate::scheduler::VisibilityScheduler;

const MAX_TITLE_LEN: usize = 200;
const MAX_TAGS: usize = 15;
const MIN_TAG_LEN: usize = 1;
const MAX_TAG_LEN: usize = 40;
const MAX_BODY_CHARS: usize = 1_000_000;

pub struct PublishCoordinator {
    store: Arc<dyn Store>,
    scheduler: Arc<VisibilityScheduler>,
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub note_id: String,
    pub collection_ids: Vec<String>,
    pub label: Option<VersionLabel>,
    pub client_token: String,
}

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub note_id: String,
    pub target_version_id: String,
    pub client_token: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishOutcome {
    pub version_id: String,
    pub publication_id: String,
    pub idempotent_replay: bool,
}

impl PublishCoordinator {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<VisibilityScheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn publish(&self, request: PublishRequest) -> Result<PublishOutcome> {
        if let Some(version_id) = self
            .store
            .lookup_idempotency_token(&request.note_id, &request.client_token)?
        {
            return Ok(PublishOutcome {
                version_id,
                publication_id: String::new(),
                idempotent_replay: true,
            });
        }

        let note = self.store.get_note(&request.note_id)?;
        let draft = self.store.get_draft(&request.note_id)?;

        validate_title(&note.title)?;
        validate_tags(&draft.tags)?;
        validate_collections(&request.collection_ids)?;
        validate_body(&draft.body_md)?;

        let normalized = kv_index::normalize(&draft.body_md);
        let content_hash = kv_core::compute_content_hash(&normalized);

        let version = Version::new(
            &request.note_id,
            draft.body_md.clone(),
            draft.tags.clone(),
            content_hash,
            note.current_version_id.clone(),
            request.label.unwrap_or(VersionLabel::Minor),
        );

        let publication = self
            .store
            .publish(&version, &request.collection_ids, request.label)?;

        self.store
            .record_idempotency_token(&request.note_id, &request.client_token, &version.id)?;

        self.scheduler.submit(VisibilityEvent::new(
            &version.id,
            &request.note_id,
            VisibilityOp::Publish,
            request.collection_ids.clone(),
        ));

        Ok(PublishOutcome {
            version_id: version.id,
            publication_id: publication.id,
            idempotent_replay: false,
        })
    }

    pub fn rollback(&self, request: RollbackRequest) -> Result<PublishOutcome> {
        if let Some(version_id) = self
            .store
            .lookup_idempotency_token(&request.note_id, &request.client_token)?
        {
            return Ok(PublishOutcome {
                version_id,
                publication_id: String::new(),
                idempotent_replay: true,
            });
        }

        let target = self.store.get_version(&request.target_version_id)?;
        if target.note_id != request.note_id {
            return Err(Error::Conflict(format!(
                "version {} does not belong to note {}",
                target.id, request.note_id
            )));
        }

        let version = Version::new(
            &request.note_id,
            target.body_md.clone(),
            target.tags.clone(),
            target.content_hash.clone(),
            Some(target.id.clone()),
            VersionLabel::Major,
        );

        let last_publication_collections = collections_for_note(self.store.as_ref(), &request.note_id)?;
        let publication = self
            .store
            .publish(&version, &last_publication_collections, Some(VersionLabel::Major))?;

        self.store
            .record_idempotency_token(&request.note_id, &request.client_token, &version.id)?;

        self.scheduler.submit(VisibilityEvent::new(
            &version.id,
            &request.note_id,
            VisibilityOp::Rollback,
            last_publication_collections,
        ));

        Ok(PublishOutcome {
            version_id: version.id,
            publication_id: publication.id,
            idempotent_replay: false,
        })
    }
}

/// A rollback carries forward whichever collections the note's most recent
/// publication named, since the request itself doesn't supply new ones.
fn collections_for_note(store: &dyn Store, note_id: &str) -> Result<Vec<String>> {
    match store.latest_publication(note_id)? {
        Some(publication) => Ok(publication.collection_ids),
        None => Err(Error::Conflict(format!(
            "note {note_id} has never been published; rollback has nothing to roll back to"
        ))),
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::validation(["title must not be empty"]));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::validation([format!(
            "title exceeds {} characters",
            MAX_TITLE_LEN
        )]));
    }
    Ok(())
}

/// Tags are restricted to lowercase letters, digits, and internal
/// hyphens/underscores — the spec leaves the allowed charset
/// unenumerated; this choice is recorded in DESIGN.md.
fn tag_has_allowed_characters(tag: &str) -> bool {
    tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS {
        return Err(Error::validation([format!("more than {} tags", MAX_TAGS)]));
    }
    for tag in tags {
        let len = tag.chars().count();
        if len < MIN_TAG_LEN || len > MAX_TAG_LEN {
            return Err(Error::validation([format!(
                "tag '{}' must be {}..{} characters",
                tag, MIN_TAG_LEN, MAX_TAG_LEN
            )]));
        }
        if !tag_has_allowed_characters(tag) {
            return Err(Error::validation([format!(
                "tag '{}' must contain only lowercase letters, digits, '-', or '_'",
                tag
            )]));
        }
    }
    Ok(())
}

fn validate_collections(collection_ids: &[String]) -> Result<()> {
    if collection_ids.is_empty() {
        return Err(Error::validation(["at least one collection is required"]));
    }
    Ok(())
}

fn validate_body(body_md: &str) -> Result<()> {
    if body_md.chars().count() > MAX_BODY_CHARS {
        return Err(Error::validation([format!(
            "body exceeds {} characters",
            MAX_BODY_CHARS
        )]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use kv_core::InMemoryStore;

    fn coordinator() -> (Arc<InMemoryStore>, PublishCoordinator) {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(VisibilityScheduler::new(SchedulerConfig::default()));
        let coordinator = PublishCoordinator::new(store.clone(), scheduler);
        (store, coordinator)
    }

    #[test]
    fn publish_snapshots_the_draft_into_a_new_version() {
        let (store, coordinator) = coordinator();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "hello world", vec![]).unwrap();
        let col = store.create_collection("Research", None).unwrap();

        let outcome = coordinator
            .publish(PublishRequest {
                note_id: note.id.clone(),
                collection_ids: vec![col.id],
                label: None,
                client_token: "tok-1".into(),
            })
            .unwrap();

        assert!(!outcome.idempotent_replay);
        let version = store.get_version(&outcome.version_id).unwrap();
        assert_eq!(version.body_md, "hello world");
    }

    #[test]
    fn publish_rejects_empty_collections() {
        let (store, coordinator) = coordinator();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "hello world", vec![]).unwrap();

        let result = coordinator.publish(PublishRequest {
            note_id: note.id,
            collection_ids: vec![],
            label: None,
            client_token: "tok-1".into(),
        });

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn publish_rejects_a_tag_with_disallowed_characters() {
        let (store, coordinator) = coordinator();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "hello world", vec!["Not Allowed!".to_string()]).unwrap();
        let col = store.create_collection("Research", None).unwrap();

        let result = coordinator.publish(PublishRequest {
            note_id: note.id,
            collection_ids: vec![col.id],
            label: None,
            client_token: "tok-1".into(),
        });

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn publish_rejects_an_empty_tag() {
        let (store, coordinator) = coordinator();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "hello world", vec![String::new()]).unwrap();
        let col = store.create_collection("Research", None).unwrap();

        let result = coordinator.publish(PublishRequest {
            note_id: note.id,
            collection_ids: vec![col.id],
            label: None,
            client_token: "tok-1".into(),
        });

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn publish_is_idempotent_under_the_same_client_token() {
        let (store, coordinator) = coordinator();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "hello world", vec![]).unwrap();
        let col = store.create_collection("Research", None).unwrap();

        let first = coordinator
            .publish(PublishRequest {
                note_id: note.id.clone(),
                collection_ids: vec![col.id.clone()],
                label: None,
                client_token: "tok-1".into(),
            })
            .unwrap();

        store.save_draft(&note.id, "second edit", vec![]).unwrap();

        let second = coordinator
            .publish(PublishRequest {
                note_id: note.id,
                collection_ids: vec![col.id],
                label: None,
                client_token: "tok-1".into(),
            })
            .unwrap();

        assert!(second.idempotent_replay);
        assert_eq!(first.version_id, second.version_id);
    }

    #[test]
    fn rollback_creates_a_major_version_with_the_target_body() {
        let (store, coordinator) = coordinator();
        let note = store.create_note("Title", vec![]).unwrap();
        store.save_draft(&note.id, "v1 body", vec![]).unwrap();
        let col = store.create_collection("Research", None).unwrap();
        let first = coordinator
            .publish(PublishRequest {
                note_id: note.id.clone(),
                collection_ids: vec![col.id.clone()],
                label: None,
                client_token: "tok-1".into(),
            })
            .unwrap();

        let rolled_back = coordinator
            .rollback(RollbackRequest {
                note_id: note.id,
                target_version_id: first.version_id.clone(),
                client_token: "tok-2".into(),
            })
            .unwrap();

        let version = store.get_version(&rolled_back.version_id).unwrap();
        assert_eq!(version.body_md, "v1 body");
        assert_eq!(version.label, VersionLabel::Major);
        assert_eq!(version.parent_version_id, Some(first.version_id));
    }
}

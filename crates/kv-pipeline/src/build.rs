//! Turns one `VisibilityEvent` into a full index rebuild-and-commit.
//!
//! Re-chunks and re-anchors the version the event names, refreshes the
//! derived Passage/Anchor stores for it, then rebuilds the whole segment
//! from every note's currently published version before handing it to
//! `InvertedIndex::commit`. Simple and correct rather than incremental: the
//! segment is small enough per workspace that a full rebuild on every
//! visibility event is cheap compared to the I/O it replaces.

use std::sync::Arc;

use kv_core::{Store, VisibilityEvent};
use kv_index::{AnchorStore, ChunkConfig, FingerprintAlgo, IndexBuilder, InvertedIndex, PassageStore};

use crate::scheduler::{SchedulerError, VisibilityScheduler};

pub struct IndexingContext {
    store: Arc<dyn Store>,
    passage_store: Arc<PassageStore>,
    anchor_store: Arc<AnchorStore>,
    index: Arc<InvertedIndex>,
    chunk_config: ChunkConfig,
    scheduler: Arc<VisibilityScheduler>,
}

impl IndexingContext {
    pub fn new(
        store: Arc<dyn Store>,
        passage_store: Arc<PassageStore>,
        anchor_store: Arc<AnchorStore>,
        index: Arc<InvertedIndex>,
        chunk_config: ChunkConfig,
        scheduler: Arc<VisibilityScheduler>,
    ) -> Self {
        Self { store, passage_store, anchor_store, index, chunk_config, scheduler }
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn passage_store(&self) -> &PassageStore {
        &self.passage_store
    }

    pub fn anchor_store(&self) -> &AnchorStore {
        &self.anchor_store
    }

    pub fn build_and_commit(&self, event: &VisibilityEvent) -> Result<(), SchedulerError> {
        self.rechunk_version(&event.version_id)
            .map_err(|e| SchedulerError::BuildStageFailed(e.to_string()))?;
        self.scheduler.mark_built(&event.version_id);

        let mut expected_version_ids = std::collections::HashSet::new();
        let mut version_collections: Vec<(String, Vec<String>)> = Vec::new();

        let mut page = 0;
        loop {
            let notes_page = self
                .store
                .list_notes(page, 200)
                .map_err(|e| SchedulerError::BuildStageFailed(e.to_string()))?;
            if notes_page.items.is_empty() {
                break;
            }
            for note in &notes_page.items {
                let Some(version_id) = &note.current_version_id else { continue };
                expected_version_ids.insert(version_id.clone());
                let collection_ids = self
                    .store
                    .latest_publication(&note.id)
                    .map_err(|e| SchedulerError::BuildStageFailed(e.to_string()))?
                    .map(|p| p.collection_ids)
                    .unwrap_or_default();
                version_collections.push((version_id.clone(), collection_ids));
            }
            if notes_page.items.len() < 200 {
                break;
            }
            page += 1;
        }

        let mut builder = IndexBuilder::new(expected_version_ids);
        for (version_id, collection_ids) in version_collections {
            for passage in self.passage_store.iterate_by_version(&version_id) {
                builder.add_passage(passage, collection_ids.clone());
            }
        }

        self.scheduler.mark_committing(&event.version_id);
        self.index
            .commit(builder)
            .map_err(|e| SchedulerError::HealthCheckFailed(e.to_string()))
    }

    fn rechunk_version(&self, version_id: &str) -> kv_core::Result<()> {
        let version = self.store.get_version(version_id)?;
        let normalized = kv_index::normalize(&version.body_md);
        let tokenized = kv_index::tokenize(&normalized);
        let passages = kv_index::chunk(version_id, &normalized, &tokenized, &self.chunk_config)
            .map_err(|e| kv_core::Error::Internal(e.to_string()))?;

        self.passage_store.delete_by_version(version_id);
        self.anchor_store.delete_by_version(version_id);

        for passage in &passages {
            let anchor = kv_index::create_anchor(
                &normalized,
                &passage.structure_path,
                passage.token_span.offset,
                passage.token_span.length,
                FingerprintAlgo::Sha256,
            )
            .map_err(|e| kv_core::Error::Internal(e.to_string()))?;
            self.anchor_store.put(&passage.id, version_id, anchor);
        }
        self.passage_store.put_all(passages);
        Ok(())
    }
}

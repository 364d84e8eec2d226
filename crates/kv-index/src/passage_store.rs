//! In-memory passage store.
//!
//! Keyed by `passage_id`, with a secondary `version_id -> {passage_id}`
//! index for bulk operations. Entirely derived state: nothing here survives
//! a process restart on its own, only as a recomputation from Versions plus
//! the chunker config that produced them.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::model::Passage;

#[derive(Default)]
pub struct PassageStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    passages: HashMap<String, Passage>,
    by_version: HashMap<String, HashSet<String>>,
}

impl PassageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, passage: Passage) {
        let mut inner = self.inner.write().unwrap();
        inner
            .by_version
            .entry(passage.version_id.clone())
            .or_default()
            .insert(passage.id.clone());
        inner.passages.insert(passage.id.clone(), passage);
    }

    pub fn put_all(&self, passages: Vec<Passage>) {
        for passage in passages {
            self.put(passage);
        }
    }

    pub fn get(&self, passage_id: &str) -> Option<Passage> {
        self.inner.read().unwrap().passages.get(passage_id).cloned()
    }

    pub fn delete_by_version(&self, version_id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(ids) = inner.by_version.remove(version_id) {
            for id in ids {
                inner.passages.remove(&id);
            }
        }
    }

    pub fn iterate_by_version(&self, version_id: &str) -> Vec<Passage> {
        let inner = self.inner.read().unwrap();
        inner
            .by_version
            .get(version_id)
            .map(|ids| ids.iter().filter_map(|id| inner.passages.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

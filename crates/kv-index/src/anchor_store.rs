//! In-memory map from passage id to the `Anchor` computed for it at chunk
//! time. Rebuilt alongside the Passage Store whenever a Version's passages
//! are rebuilt; never persisted on its own.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::model::Anchor;

#[derive(Default)]
struct Inner {
    anchors: HashMap<String, Anchor>,
    by_version: HashMap<String, HashSet<String>>,
}

pub struct AnchorStore {
    inner: RwLock<Inner>,
}

impl AnchorStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    pub fn put(&self, passage_id: &str, version_id: &str, anchor: Anchor) {
        let mut inner = self.inner.write().unwrap();
        inner.anchors.insert(passage_id.to_string(), anchor);
        inner
            .by_version
            .entry(version_id.to_string())
            .or_default()
            .insert(passage_id.to_string());
    }

    pub fn get(&self, passage_id: &str) -> Option<Anchor> {
        self.inner.read().unwrap().anchors.get(passage_id).cloned()
    }

    pub fn delete_by_version(&self, version_id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(passage_ids) = inner.by_version.remove(version_id) {
            for passage_id in passage_ids {
                inner.anchors.remove(&passage_id);
            }
        }
    }
}

impl Default for AnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FingerprintAlgo;

    fn anchor() -> Anchor {
        Anchor {
            structure_path: "/".to_string(),
            token_offset: 0,
            token_length: 3,
            fingerprint: "fp".to_string(),
            tokenization_version: 1,
            fingerprint_algo: FingerprintAlgo::Sha256,
            canonical_tokens: vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()],
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let store = AnchorStore::new();
        store.put("pas_1", "ver_1", anchor());
        assert!(store.get("pas_1").is_some());
    }

    #[test]
    fn delete_by_version_removes_all_its_anchors() {
        let store = AnchorStore::new();
        store.put("pas_1", "ver_1", anchor());
        store.put("pas_2", "ver_1", anchor());
        store.put("pas_3", "ver_2", anchor());
        store.delete_by_version("ver_1");
        assert!(store.get("pas_1").is_none());
        assert!(store.get("pas_2").is_none());
        assert!(store.get("pas_3").is_some());
    }
}

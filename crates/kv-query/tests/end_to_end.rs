//! Anchor drift scenario: a citation pinned to content that no longer
//! exists in the version it's attached to must never be served as an
//! answer, even though the passage it names still ranks as a search hit.

use std::collections::HashSet;
use std::sync::Arc;

use kv_core::{InMemoryStore, Store, Version, VersionLabel};
use kv_index::{create_anchor, normalize, tokenize, AnchorStore, ChunkConfig, FingerprintAlgo, IndexBuilder, InvertedIndex};
use kv_query::{NoAnswerReason, Query, QueryEngine};

#[test]
fn unresolved_anchor_drift_yields_no_answer_not_a_stale_citation() {
    let store = Arc::new(InMemoryStore::new());
    let note = store.create_note("Title", vec![]).unwrap();

    // The original body the citation anchor `a` was minted against.
    let original_body = "The quick brown fox";
    let original_normalized = normalize(original_body);
    let original_tokens = tokenize(&original_normalized);
    let brown_offset = original_tokens.tokens.iter().position(|t| t == "brown").unwrap();
    let stale_anchor = create_anchor(&original_normalized, "/", brown_offset, 1, FingerprintAlgo::Sha256).unwrap();

    // The note has since moved on to a version that shares no content with
    // the anchor's original span, but the anchor is still attached to one
    // of its passages (as if nobody ever re-anchored it after the edit).
    let replaced_body = "entirely different prose with no fox";
    let replaced_normalized = normalize(replaced_body);
    let content_hash = kv_core::compute_content_hash(&replaced_normalized);
    let version = Version::new(&note.id, replaced_body, vec![], content_hash, None, VersionLabel::Minor);
    store.create_version(&version).unwrap();

    let replaced_tokens = tokenize(&replaced_normalized);
    let passages = kv_index::chunk(&version.id, &replaced_normalized, &replaced_tokens, &ChunkConfig::default()).unwrap();
    assert_eq!(passages.len(), 1, "short body should chunk to a single passage");

    let anchor_store = Arc::new(AnchorStore::new());
    anchor_store.put(&passages[0].id, &version.id, stale_anchor);

    let mut expected = HashSet::new();
    expected.insert(version.id.clone());
    let mut builder = IndexBuilder::new(expected);
    builder.add_passage(passages[0].clone(), vec![]);
    let index = Arc::new(InvertedIndex::new());
    index.commit(builder).unwrap();

    let engine = QueryEngine::new(store, index, anchor_store);
    let response = engine.search(&Query::new("fox", vec![], 0, None), "q5").unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].version_id, version.id);
    assert!(response.answer.is_none());
    assert_eq!(response.no_answer_reason, Some(NoAnswerReason::UnresolvedAnchors));
}

//! Query Engine: scope resolution → retrieve → rerank → dedup → paginate →
//! compose answer, with SLO-driven backpressure on rerank depth.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use kv_core::{Error, Result, Store};
use kv_index::{resolve, AnchorStore, InvertedIndex, Resolution};

use crate::answer::{Answer, Citation, NoAnswerReason, SearchResponse, SearchResult};
use crate::backpressure::{BackpressureConfig, LatencyTracker};
use crate::query::Query;

const TOP_K_RETRIEVE: usize = 128;
const MAX_ANSWER_CANDIDATES: usize = 10;
const MAX_CITATIONS: usize = 3;

pub struct QueryEngine {
    store: Arc<dyn Store>,
    index: Arc<InvertedIndex>,
    anchor_store: Arc<AnchorStore>,
    latency: LatencyTracker,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn Store>, index: Arc<InvertedIndex>, anchor_store: Arc<AnchorStore>) -> Self {
        Self::with_backpressure_config(store, index, anchor_store, BackpressureConfig::default())
    }

    pub fn with_backpressure_config(
        store: Arc<dyn Store>,
        index: Arc<InvertedIndex>,
        anchor_store: Arc<AnchorStore>,
        backpressure_config: BackpressureConfig,
    ) -> Self {
        Self { store, index, anchor_store, latency: LatencyTracker::new(backpressure_config) }
    }

    pub fn search(&self, query: &Query, query_id: impl Into<String>) -> Result<SearchResponse> {
        query.validate()?;
        let query_id = query_id.into();
        let started = Instant::now();

        if !self.index.is_ready() {
            return Err(Error::IndexNotReady);
        }

        let resolved_scope = self.resolve_scope(&query.collection_scope)?;
        if let Some(reason) = resolved_scope.empty_scope_reason {
            self.latency.record(elapsed_ms(started));
            return Ok(empty_response(query_id, query.page, query.page_size, reason));
        }

        let top_k_rerank = self.latency.current_top_k_rerank();
        let retrieved = self.index.retrieve(&query.text, &resolved_scope.collection_ids, TOP_K_RETRIEVE);

        let mut reranked = retrieved;
        reranked.truncate(top_k_rerank);
        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap()
                .then_with(|| a.version_id.cmp(&b.version_id))
                .then_with(|| a.passage_id.cmp(&b.passage_id))
        });

        let deduped = self.dedup_by_note_and_version(reranked)?;

        let total_count = deduped.len();
        let start = query.page * query.page_size;
        let page_items: Vec<SearchResult> = deduped
            .iter()
            .skip(start)
            .take(query.page_size)
            .map(to_search_result)
            .collect();
        let has_more = start + page_items.len() < total_count;

        let (answer, no_answer_reason) = self.compose_answer(&deduped)?;

        self.latency.record(elapsed_ms(started));

        Ok(SearchResponse {
            query_id,
            results: page_items,
            answer,
            no_answer_reason,
            page: query.page,
            page_size: query.page_size,
            total_count,
            has_more,
        })
    }

    /// Resolve one anchor against the current body of the version it names,
    /// independent of any index state. Backs the `ResolveAnchor` transport op.
    pub fn resolve_anchor(&self, version_id: &str, anchor: &kv_index::Anchor) -> Result<Resolution> {
        let version = self.store.get_version(version_id)?;
        let normalized_body = kv_index::normalize(&version.body_md);
        Ok(resolve(anchor, &normalized_body))
    }

    fn resolve_scope(&self, names: &[String]) -> Result<ResolvedScope> {
        if names.is_empty() {
            return Ok(ResolvedScope { collection_ids: vec![], empty_scope_reason: None });
        }
        let mut ids = Vec::new();
        for name in names {
            if let Some(collection) = self.store.lookup_collection_by_name(name)? {
                ids.push(collection.id);
            }
        }
        if ids.is_empty() {
            return Ok(ResolvedScope { collection_ids: vec![], empty_scope_reason: Some(NoAnswerReason::EmptyScope) });
        }
        Ok(ResolvedScope { collection_ids: ids, empty_scope_reason: None })
    }

    fn dedup_by_note_and_version(&self, passages: Vec<kv_index::RetrievedPassage>) -> Result<Vec<DedupedHit>> {
        let mut note_ids: HashMap<String, String> = HashMap::new();
        let mut best: HashMap<(String, String), DedupedHit> = HashMap::new();

        for passage in passages {
            let note_id = match note_ids.get(&passage.version_id) {
                Some(id) => id.clone(),
                None => {
                    let version = self.store.get_version(&passage.version_id)?;
                    note_ids.insert(passage.version_id.clone(), version.note_id.clone());
                    version.note_id
                }
            };
            let key = (note_id.clone(), passage.version_id.clone());
            let hit = DedupedHit {
                note_id,
                version_id: passage.version_id,
                passage_id: passage.passage_id,
                score: passage.score,
                snippet: passage.snippet,
                structure_path: passage.structure_path,
            };
            best.entry(key)
                .and_modify(|existing| {
                    if hit.score > existing.score {
                        *existing = hit.clone();
                    }
                })
                .or_insert(hit);
        }

        let mut out: Vec<DedupedHit> = best.into_values().collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap()
                .then_with(|| a.version_id.cmp(&b.version_id))
                .then_with(|| a.passage_id.cmp(&b.passage_id))
        });
        Ok(out)
    }

    fn compose_answer(&self, deduped: &[DedupedHit]) -> Result<(Option<Answer>, Option<NoAnswerReason>)> {
        if deduped.is_empty() {
            return Ok((None, Some(NoAnswerReason::InsufficientEvidence)));
        }

        let candidates = &deduped[..deduped.len().min(MAX_ANSWER_CANDIDATES)];
        let mut citations = Vec::new();

        for hit in candidates {
            if citations.len() >= MAX_CITATIONS {
                break;
            }
            let Some(anchor) = self.anchor_store.get(&hit.passage_id) else { continue };
            let version = self.store.get_version(&hit.version_id)?;
            let normalized_body = kv_index::normalize(&version.body_md);
            let resolved = match resolve(&anchor, &normalized_body) {
                Resolution::Unchanged | Resolution::Reanchored { .. } => true,
                Resolution::Unresolved { .. } => false,
            };
            if !resolved {
                continue;
            }
            citations.push(Citation {
                passage_id: hit.passage_id.clone(),
                version_id: hit.version_id.clone(),
                note_id: hit.note_id.clone(),
                anchor,
                snippet: hit.snippet.clone(),
                confidence: hit.score,
            });
        }

        if citations.is_empty() {
            return Ok((None, Some(NoAnswerReason::UnresolvedAnchors)));
        }

        let text = citations.iter().map(|c| c.snippet.as_str()).collect::<Vec<_>>().join(" ");
        let coverage_cited = citations.len();
        Ok((
            Some(Answer { text, citations, coverage_claims: candidates.len(), coverage_cited }),
            None,
        ))
    }
}

struct ResolvedScope {
    collection_ids: Vec<String>,
    empty_scope_reason: Option<NoAnswerReason>,
}

#[derive(Debug, Clone)]
struct DedupedHit {
    note_id: String,
    version_id: String,
    passage_id: String,
    score: f64,
    snippet: String,
    structure_path: String,
}

fn to_search_result(hit: &DedupedHit) -> SearchResult {
    SearchResult {
        note_id: hit.note_id.clone(),
        version_id: hit.version_id.clone(),
        passage_id: hit.passage_id.clone(),
        score: hit.score,
        snippet: hit.snippet.clone(),
        structure_path: hit.structure_path.clone(),
    }
}

fn empty_response(query_id: String, page: usize, page_size: usize, reason: NoAnswerReason) -> SearchResponse {
    SearchResponse {
        query_id,
        results: vec![],
        answer: None,
        no_answer_reason: Some(reason),
        page,
        page_size,
        total_count: 0,
        has_more: false,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

//! Segmented, two-phase inverted index.
//!
//! Writers build a full replacement index into a shadow `IndexBuilder`
//! while readers keep querying the previously committed segment. Commit is
//! a single atomic pointer swap, gated by a health check that must pass
//! before the new segment becomes visible.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use rayon::prelude::*;

use crate::model::{IndexLifecycleState, Passage, RetrievedPassage};
use crate::tokenize::tokenize;

/// Schema shape this build understands. A segment built by a different
/// version is rejected at the health gate rather than silently swapped in.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// Per-field weight applied to a term's contribution before BM25 scoring.
/// `content` carries the most weight since it is the actual passage body;
/// `structure_path` tokens are rarer and highly discriminating so get a
/// strong boost too.
const FIELD_BOOST_CONTENT: f64 = 1.0;
const FIELD_BOOST_SNIPPET: f64 = 0.6;
const FIELD_BOOST_STRUCTURE: f64 = 1.5;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),
}

struct IndexedPassage {
    version_id: String,
    structure_path: String,
    snippet: String,
    collection_ids: Vec<String>,
    weighted_len: f64,
}

struct Posting {
    passage_id: String,
    weighted_tf: f64,
}

/// An immutable, queryable index segment. Once built and committed it is
/// never mutated; a new corpus produces a new segment entirely.
pub struct Segment {
    postings: HashMap<String, Vec<Posting>>,
    passages: HashMap<String, IndexedPassage>,
    avg_weighted_len: f64,
    schema_version: u32,
}

impl Segment {
    fn doc_count(&self) -> usize {
        self.passages.len()
    }
}

/// Accumulates passages for a not-yet-committed segment. Readers never see
/// a builder's state; only `InvertedIndex::commit` exposes it, and only
/// after the health gate passes.
pub struct IndexBuilder {
    expected_version_ids: HashSet<String>,
    entries: Vec<(Passage, Vec<String>)>,
}

impl IndexBuilder {
    pub fn new(expected_version_ids: HashSet<String>) -> Self {
        Self {
            expected_version_ids,
            entries: Vec::new(),
        }
    }

    /// Register one passage, tagged with the collections its owning
    /// Version is currently published into.
    pub fn add_passage(&mut self, passage: Passage, collection_ids: Vec<String>) {
        self.entries.push((passage, collection_ids));
    }

    /// Run the health gate and materialize a `Segment` if it passes.
    ///
    /// Gate conditions: every expected version id has at least one indexed
    /// passage; no passage references a version id outside the expected
    /// set; no duplicate passage ids; schema version matches.
    pub fn build(self) -> Result<Segment, IndexError> {
        let mut seen_passage_ids = HashSet::new();
        let mut versions_with_passages: HashSet<String> = HashSet::new();

        for (passage, _) in &self.entries {
            if !seen_passage_ids.insert(passage.id.clone()) {
                return Err(IndexError::HealthCheckFailed(format!(
                    "duplicate passage id {}",
                    passage.id
                )));
            }
            if !self.expected_version_ids.contains(&passage.version_id) {
                return Err(IndexError::HealthCheckFailed(format!(
                    "orphan passage {} references unexpected version {}",
                    passage.id, passage.version_id
                )));
            }
            versions_with_passages.insert(passage.version_id.clone());
        }

        let missing: Vec<&String> = self
            .expected_version_ids
            .iter()
            .filter(|v| !versions_with_passages.contains(*v))
            .collect();
        if !missing.is_empty() {
            return Err(IndexError::HealthCheckFailed(format!(
                "{} version(s) have no indexed passage",
                missing.len()
            )));
        }

        // Tokenize and score every passage's fields in parallel; the index
        // build itself is otherwise single-threaded reduction over the
        // per-passage term maps.
        let scored: Vec<(Passage, Vec<String>, HashMap<String, f64>, f64)> = self
            .entries
            .into_par_iter()
            .map(|(passage, collection_ids)| {
                let (term_weights, weighted_len) = weighted_term_frequencies(&passage);
                (passage, collection_ids, term_weights, weighted_len)
            })
            .collect();

        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut passages = HashMap::new();
        let mut total_weighted_len = 0.0;

        for (passage, collection_ids, term_weights, weighted_len) in scored {
            total_weighted_len += weighted_len;
            for (term, weight) in term_weights {
                postings.entry(term).or_default().push(Posting {
                    passage_id: passage.id.clone(),
                    weighted_tf: weight,
                });
            }
            passages.insert(
                passage.id.clone(),
                IndexedPassage {
                    version_id: passage.version_id,
                    structure_path: passage.structure_path,
                    snippet: passage.snippet,
                    collection_ids,
                    weighted_len,
                },
            );
        }

        let avg_weighted_len = if passages.is_empty() {
            0.0
        } else {
            total_weighted_len / passages.len() as f64
        };

        Ok(Segment {
            postings,
            passages,
            avg_weighted_len,
            schema_version: INDEX_SCHEMA_VERSION,
        })
    }
}

/// Field-boosted term frequencies for one passage, plus its field-boosted
/// length (for BM25 length normalization).
fn weighted_term_frequencies(passage: &Passage) -> (HashMap<String, f64>, f64) {
    let mut weights: HashMap<String, f64> = HashMap::new();
    let mut len = 0.0;

    for (text, boost) in [
        (passage.content.as_str(), FIELD_BOOST_CONTENT),
        (passage.snippet.as_str(), FIELD_BOOST_SNIPPET),
        (passage.structure_path.as_str(), FIELD_BOOST_STRUCTURE),
    ] {
        let tokenized = tokenize(text);
        len += tokenized.len() as f64 * boost;
        for token in &tokenized.tokens {
            *weights.entry(token.to_lowercase()).or_insert(0.0) += boost;
        }
    }
    (weights, len)
}

/// The search-facing index: holds the currently committed segment (if any)
/// behind a pointer swap.
pub struct InvertedIndex {
    current: RwLock<Option<Arc<Segment>>>,
    state: RwLock<IndexLifecycleState>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            state: RwLock::new(IndexLifecycleState::Building),
        }
    }

    pub fn state(&self) -> IndexLifecycleState {
        *self.state.read().unwrap()
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().unwrap().is_some()
    }

    /// Build from `builder`, and on success, atomically install the result
    /// as the current segment. Readers mid-query against the prior segment
    /// are unaffected; they hold their own `Arc`.
    pub fn commit(&self, builder: IndexBuilder) -> Result<(), IndexError> {
        *self.state.write().unwrap() = IndexLifecycleState::Building;
        let segment = builder.build()?;
        let mut current = self.current.write().unwrap();
        *current = Some(Arc::new(segment));
        *self.state.write().unwrap() = IndexLifecycleState::Ready;
        Ok(())
    }

    /// Score and rank passages against `query_text`, restricted to
    /// `collection_filter` when non-empty.
    pub fn retrieve(&self, query_text: &str, collection_filter: &[String], top_k: usize) -> Vec<RetrievedPassage> {
        let segment = match self.current.read().unwrap().clone() {
            Some(segment) => segment,
            None => return Vec::new(),
        };

        let query_terms: Vec<String> = tokenize(query_text)
            .tokens
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let doc_count = segment.doc_count().max(1) as f64;
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for term in &query_terms {
            let Some(postings) = segment.postings.get(term) else {
                continue;
            };
            let idf = ((doc_count - postings.len() as f64 + 0.5) / (postings.len() as f64 + 0.5) + 1.0).ln();
            for posting in postings {
                let Some(indexed) = segment.passages.get(&posting.passage_id) else {
                    continue;
                };
                if !collection_filter.is_empty()
                    && !indexed.collection_ids.iter().any(|c| collection_filter.contains(c))
                {
                    continue;
                }
                let len_norm = 1.0 - BM25_B + BM25_B * (indexed.weighted_len / segment.avg_weighted_len.max(1.0));
                let tf_component =
                    (posting.weighted_tf * (BM25_K1 + 1.0)) / (posting.weighted_tf + BM25_K1 * len_norm);
                *scores.entry(posting.passage_id.as_str()).or_insert(0.0) += idf * tf_component;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().map(|(id, s)| (id.to_string(), s)).collect();
        ranked.sort_by(|(id_a, score_a), (id_b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap()
                .then_with(|| id_a.cmp(id_b))
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(passage_id, score)| {
                let indexed = &segment.passages[&passage_id];
                RetrievedPassage {
                    version_id: indexed.version_id.clone(),
                    passage_id,
                    score,
                    snippet: indexed.snippet.clone(),
                    structure_path: indexed.structure_path.clone(),
                    collection_ids: indexed.collection_ids.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenSpan;

    fn make_passage(id: &str, version_id: &str, content: &str) -> Passage {
        Passage {
            id: id.to_string(),
            version_id: version_id.to_string(),
            structure_path: "/".to_string(),
            token_span: TokenSpan { offset: 0, length: content.split_whitespace().count() },
            snippet: content.to_string(),
            content: content.to_string(),
            content_hash: "hash".to_string(),
        }
    }

    #[test]
    fn index_starts_not_ready() {
        let index = InvertedIndex::new();
        assert!(!index.is_ready());
    }

    #[test]
    fn commit_makes_index_ready() {
        let index = InvertedIndex::new();
        let mut expected = HashSet::new();
        expected.insert("ver_1".to_string());
        let mut builder = IndexBuilder::new(expected);
        builder.add_passage(make_passage("pas_1", "ver_1", "alpha beta gamma"), vec!["col_1".into()]);
        index.commit(builder).unwrap();
        assert!(index.is_ready());
        assert_eq!(index.state(), IndexLifecycleState::Ready);
    }

    #[test]
    fn commit_fails_when_a_version_has_no_passage() {
        let index = InvertedIndex::new();
        let mut expected = HashSet::new();
        expected.insert("ver_1".to_string());
        expected.insert("ver_2".to_string());
        let mut builder = IndexBuilder::new(expected);
        builder.add_passage(make_passage("pas_1", "ver_1", "alpha"), vec![]);
        assert!(index.commit(builder).is_err());
        assert!(!index.is_ready());
    }

    #[test]
    fn commit_fails_on_orphan_passage() {
        let index = InvertedIndex::new();
        let mut expected = HashSet::new();
        expected.insert("ver_1".to_string());
        let mut builder = IndexBuilder::new(expected);
        builder.add_passage(make_passage("pas_1", "ver_other", "alpha"), vec![]);
        assert!(index.commit(builder).is_err());
    }

    #[test]
    fn commit_fails_on_duplicate_passage_id() {
        let index = InvertedIndex::new();
        let mut expected = HashSet::new();
        expected.insert("ver_1".to_string());
        let mut builder = IndexBuilder::new(expected);
        builder.add_passage(make_passage("pas_1", "ver_1", "alpha"), vec![]);
        builder.add_passage(make_passage("pas_1", "ver_1", "beta"), vec![]);
        assert!(index.commit(builder).is_err());
    }

    #[test]
    fn retrieve_ranks_by_term_match() {
        let index = InvertedIndex::new();
        let mut expected = HashSet::new();
        expected.insert("ver_1".to_string());
        expected.insert("ver_2".to_string());
        let mut builder = IndexBuilder::new(expected);
        builder.add_passage(make_passage("pas_1", "ver_1", "rust programming language"), vec!["col_1".into()]);
        builder.add_passage(make_passage("pas_2", "ver_2", "gardening tips for spring"), vec!["col_1".into()]);
        index.commit(builder).unwrap();

        let results = index.retrieve("rust programming", &[], 10);
        assert_eq!(results[0].passage_id, "pas_1");
    }

    #[test]
    fn retrieve_respects_collection_filter() {
        let index = InvertedIndex::new();
        let mut expected = HashSet::new();
        expected.insert("ver_1".to_string());
        let mut builder = IndexBuilder::new(expected);
        builder.add_passage(make_passage("pas_1", "ver_1", "rust programming"), vec!["col_other".into()]);
        index.commit(builder).unwrap();

        let results = index.retrieve("rust", &["col_target".to_string()], 10);
        assert!(results.is_empty());
    }

    #[test]
    fn retrieve_against_empty_index_is_empty() {
        let index = InvertedIndex::new();
        assert!(index.retrieve("anything", &[], 10).is_empty());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open token range `[offset, offset+length)` into a tokenized
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub offset: usize,
    pub length: usize,
}

/// A derived, indexable unit of a Version's body: one chunk produced by the
/// Chunker. Never itself persisted independent of its owning Version —
/// rebuilt whenever the corpus changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub version_id: String,
    pub structure_path: String,
    pub token_span: TokenSpan,
    pub snippet: String,
    pub content: String,
    pub content_hash: String,
}

/// A resolvable pointer into a Version's body, addressed by structure path
/// and token span rather than by byte offset, so it survives edits that
/// don't touch the anchored span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub structure_path: String,
    pub token_offset: usize,
    pub token_length: usize,
    pub fingerprint: String,
    pub tokenization_version: u32,
    pub fingerprint_algo: FingerprintAlgo,
    /// The tokens the fingerprint was taken over, kept alongside the hash so
    /// a failed resolution can fall back to nearest-match-by-edit-distance
    /// against the original span instead of just its digest.
    pub canonical_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintAlgo {
    Sha256,
    Blake3,
}

/// Outcome of `AnchorEngine::resolve`.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The anchor's stored offset still matches; content at that span is
    /// unchanged.
    Unchanged,
    /// The original span moved but was relocated unambiguously; carries the
    /// new offset/length to re-anchor with.
    Reanchored { token_offset: usize, token_length: usize },
    /// No unambiguous match could be found.
    Unresolved {
        reason: UnresolvedReason,
        nearest_offset: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    NoMatch,
    AmbiguousMatch,
}

/// Drift classification between an anchor and a candidate body, independent
/// of whether resolution ultimately succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftReport {
    pub content_changed: bool,
    pub structure_changed: bool,
    pub fingerprint_mismatch: bool,
    pub suggested_reanchor: Option<TokenSpan>,
}

/// The set of Versions a built Index is meant to serve, plus its lifecycle
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusState {
    Fresh,
    Updating,
    Committed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub id: String,
    pub version_ids: Vec<String>,
    pub state: CorpusState,
    pub created_at: DateTime<Utc>,
}

impl Corpus {
    pub fn new(version_ids: Vec<String>) -> Self {
        Self {
            id: kv_core::ids::corpus_id(),
            version_ids,
            state: CorpusState::Fresh,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLifecycleState {
    Building,
    Ready,
    Swapping,
}

/// One scored hit returned by `InvertedIndex::retrieve`.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub version_id: String,
    pub passage_id: String,
    pub score: f64,
    pub snippet: String,
    pub structure_path: String,
    pub collection_ids: Vec<String>,
}

use kv_index::Anchor;
use serde::{Deserialize, Serialize};

/// One deduplicated, ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub note_id: String,
    pub version_id: String,
    pub passage_id: String,
    pub score: f64,
    pub snippet: String,
    pub structure_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub passage_id: String,
    pub version_id: String,
    pub note_id: String,
    pub anchor: Anchor,
    pub snippet: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub coverage_claims: usize,
    pub coverage_cited: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoAnswerReason {
    EmptyScope,
    InsufficientEvidence,
    UnresolvedAnchors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query_id: String,
    pub results: Vec<SearchResult>,
    pub answer: Option<Answer>,
    pub no_answer_reason: Option<NoAnswerReason>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub has_more: bool,
}

pub mod answer;
pub mod backpressure;
pub mod engine;
pub mod query;

pub use answer::{Answer, Citation, NoAnswerReason, SearchResponse, SearchResult};
pub use backpressure::{BackpressureConfig, LatencyTracker};
pub use engine::QueryEngine;
pub use query::{Query, MAX_PAGE_SIZE, MAX_QUERY_CHARS};

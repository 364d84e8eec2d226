use thiserror::Error;

/// Crate-wide error type for the knowledge repository core.
///
/// Variants map to the error taxonomy in the design docs: each carries
/// enough structure for a caller to match on it rather than parse text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimitExceeded { retry_after_ms: u64 },

    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("schema version mismatch: expected {expected}, found {actual}")]
    SchemaVersionMismatch { expected: String, actual: String },

    #[error("concurrent update conflict on note {note_id}")]
    ConcurrentUpdateConflict { note_id: String },

    #[error("index is not ready to serve queries")]
    IndexNotReady,

    #[error("indexing failure: {0}")]
    IndexingFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(errors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Error::Validation(errors.into_iter().map(Into::into).collect())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

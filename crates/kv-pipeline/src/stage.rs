use kv_core::Error;
use serde::{Deserialize, Serialize};

/// Lifecycle of one queued visibility operation, externally observable via
/// an idempotent status lookup by `version_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStage {
    Queued,
    Building,
    Built,
    Committing,
    Committed,
    Failed,
}

impl OperationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStage::Queued => "queued",
            OperationStage::Building => "building",
            OperationStage::Built => "built",
            OperationStage::Committing => "committing",
            OperationStage::Committed => "committed",
            OperationStage::Failed => "failed",
        }
    }
}

/// Validate that `next` is a legal stage following `current`. Mirrors the
/// explicit match-arm style used for state transitions elsewhere in this
/// workspace rather than a generic graph structure, since the stage set is
/// small and fixed.
pub fn validate_transition(current: OperationStage, next: OperationStage) -> Result<(), Error> {
    use OperationStage::*;
    let legal = matches!(
        (current, next),
        (Queued, Building)
            | (Building, Built)
            | (Building, Failed)
            | (Built, Committing)
            | (Committing, Committed)
            | (Committing, Failed)
            | (Queued, Failed) // retry exhausted without ever starting a build
            | (Failed, Queued) // requeued for retry
    );
    if legal {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "illegal stage transition: {} -> {}",
            current.as_str(),
            next.as_str()
        )))
    }
}

pub mod build;
pub mod coordinator;
pub mod scheduler;
pub mod stage;
pub mod worker_pool;

pub use build::IndexingContext;
pub use coordinator::{PublishCoordinator, PublishOutcome, PublishRequest, RollbackRequest};
pub use scheduler::{SchedulerConfig, SchedulerError, VisibilityScheduler};
pub use stage::{validate_transition, OperationStage};
pub use worker_pool::WorkerPool;

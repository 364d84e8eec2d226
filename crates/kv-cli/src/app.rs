//! Wires one SQLite-backed workspace together: `Store`, the derived index
//! stores, the `InvertedIndex`, the Visibility Scheduler's worker pool, the
//! Publish Coordinator, and the Query Engine. Each CLI subcommand borrows
//! this to run exactly one transport operation in-process.

use std::sync::Arc;

use kv_core::{Error, Result, SqliteStore, Store};
use kv_index::{AnchorStore, InvertedIndex, PassageStore};
use kv_pipeline::{IndexingContext, PublishCoordinator, VisibilityScheduler, WorkerPool};
use kv_query::QueryEngine;

use crate::config::WorkspaceConfig;
use crate::rate_limit::RateLimiter;

pub struct App {
    pub store: Arc<dyn Store>,
    pub coordinator: PublishCoordinator,
    pub query_engine: QueryEngine,
    pub scheduler: Arc<VisibilityScheduler>,
    pub indexing: Arc<IndexingContext>,
    pub rate_limiter: RateLimiter,
    worker_pool: Option<WorkerPool>,
}

impl App {
    pub fn open(config: &WorkspaceConfig) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_file(&config.db_path)?);
        let passage_store = Arc::new(PassageStore::new());
        let anchor_store = Arc::new(AnchorStore::new());
        let index = Arc::new(InvertedIndex::new());
        let scheduler = Arc::new(VisibilityScheduler::new(config.scheduler_config()));
        let indexing = Arc::new(IndexingContext::new(
            store.clone(),
            passage_store,
            anchor_store.clone(),
            index.clone(),
            config.chunk_config(),
            scheduler.clone(),
        ));

        let worker_pool = {
            let indexing = indexing.clone();
            WorkerPool::spawn(scheduler.clone(), config.scheduler_config().max_in_flight_per_workspace, move |event| {
                indexing.build_and_commit(event)
            })
        };

        let coordinator = PublishCoordinator::new(store.clone(), scheduler.clone());
        let query_engine =
            QueryEngine::with_backpressure_config(store.clone(), index, anchor_store, config.backpressure_config());

        Ok(Self {
            store,
            coordinator,
            query_engine,
            scheduler,
            indexing,
            rate_limiter: RateLimiter::default(),
            worker_pool: Some(worker_pool),
        })
    }

    pub fn shutdown(mut self) {
        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown(&self.scheduler);
        }
    }
}

pub fn map_error_for_exit(err: &Error) -> i32 {
    match err {
        Error::NotFound { .. } => 44,
        Error::Validation(_) => 40,
        Error::Conflict(_) => 49,
        Error::RateLimitExceeded { .. } => 42,
        Error::IndexNotReady | Error::IndexingFailure(_) => 53,
        Error::SchemaVersionMismatch { .. } => 42,
        _ => 1,
    }
}

//! Maps each transport operation to a call against the assembled [`App`].
//! Kept free of argument parsing — `main.rs` owns clap and hands these
//! functions already-validated, typed arguments.

use kv_core::{Result, Version, VersionLabel};
use kv_pipeline::{PublishRequest, RollbackRequest};
use kv_query::Query;

use crate::app::App;

pub fn save_draft(app: &App, note_id: &str, body_md: &str, tags: Vec<String>) -> Result<()> {
    app.rate_limiter.draft_saves.check()?;
    app.store.save_draft(note_id, body_md, tags)?;
    Ok(())
}

pub fn publish(
    app: &App,
    note_id: String,
    collection_ids: Vec<String>,
    label: Option<VersionLabel>,
    client_token: String,
) -> Result<kv_pipeline::PublishOutcome> {
    app.rate_limiter.mutations.check()?;
    app.coordinator.publish(PublishRequest { note_id, collection_ids, label, client_token })
}

pub fn rollback(
    app: &App,
    note_id: String,
    target_version_id: String,
    client_token: String,
) -> Result<kv_pipeline::PublishOutcome> {
    app.rate_limiter.mutations.check()?;
    app.coordinator.rollback(RollbackRequest { note_id, target_version_id, client_token })
}

pub fn search(
    app: &App,
    text: String,
    collection_scope: Vec<String>,
    page: usize,
    page_size: Option<usize>,
    query_id: String,
) -> Result<kv_query::SearchResponse> {
    app.rate_limiter.queries.check()?;
    let query = Query::new(text, collection_scope, page, page_size);
    app.query_engine.search(&query, query_id)
}

pub fn resolve_anchor(app: &App, version_id: &str, anchor: &kv_index::Anchor) -> Result<kv_index::Resolution> {
    app.rate_limiter.queries.check()?;
    app.query_engine.resolve_anchor(version_id, anchor)
}

pub fn list_versions(app: &App, note_id: &str, page: usize, page_size: usize) -> Result<kv_core::Page<Version>> {
    app.store.list_versions(note_id, page, page_size)
}

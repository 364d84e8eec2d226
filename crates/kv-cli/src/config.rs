//! Workspace configuration: every tunable named in §§4-5, loaded from an
//! optional TOML file layered under built-in defaults and `KV_`-prefixed
//! environment overrides. Converts into the component-level config structs
//! each library crate accepts by value, keeping those crates free of direct
//! environment access.

use serde::Deserialize;

use kv_index::ChunkConfig;
use kv_pipeline::SchedulerConfig;
use kv_query::BackpressureConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub db_path: String,
    pub chunk: ChunkSettings,
    pub scheduler: SchedulerSettings,
    pub backpressure: BackpressureSettings,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            db_path: "kv-workspace.sqlite3".to_string(),
            chunk: ChunkSettings::default(),
            scheduler: SchedulerSettings::default(),
            backpressure: BackpressureSettings::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Load defaults, layer an optional TOML file at `path` if it exists,
    /// then layer `KV_`-prefixed environment variables (e.g.
    /// `KV_SCHEDULER__MAX_RETRIES=5`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("KV").separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            max_tokens_per_passage: self.chunk.max_tokens_per_passage,
            overlap_tokens: self.chunk.overlap_tokens,
            max_note_tokens: self.chunk.max_note_tokens,
            min_passage_tokens: self.chunk.min_passage_tokens,
            preserve_structure_boundaries: self.chunk.preserve_structure_boundaries,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_in_flight_per_note: self.scheduler.max_in_flight_per_note,
            max_in_flight_per_workspace: self.scheduler.max_in_flight_per_workspace,
            aging_interval_ms: self.scheduler.aging_interval_ms,
            aging_boost: self.scheduler.aging_boost,
            max_retries: self.scheduler.max_retries,
            retry_delay_ms: self.scheduler.retry_delay_ms,
        }
    }

    pub fn backpressure_config(&self) -> BackpressureConfig {
        BackpressureConfig {
            normal_top_k_rerank: self.backpressure.normal_top_k_rerank,
            reduced_top_k_rerank: self.backpressure.reduced_top_k_rerank,
            slo_high_ms: self.backpressure.slo_high_ms,
            slo_recovery_ms: self.backpressure.slo_recovery_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ChunkSettings {
    pub max_tokens_per_passage: usize,
    pub overlap_tokens: usize,
    pub max_note_tokens: usize,
    pub min_passage_tokens: usize,
    pub preserve_structure_boundaries: bool,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        let d = ChunkConfig::default();
        Self {
            max_tokens_per_passage: d.max_tokens_per_passage,
            overlap_tokens: d.overlap_tokens,
            max_note_tokens: d.max_note_tokens,
            min_passage_tokens: d.min_passage_tokens,
            preserve_structure_boundaries: d.preserve_structure_boundaries,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub max_in_flight_per_note: usize,
    pub max_in_flight_per_workspace: usize,
    pub aging_interval_ms: i64,
    pub aging_boost: i64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let d = SchedulerConfig::default();
        Self {
            max_in_flight_per_note: d.max_in_flight_per_note,
            max_in_flight_per_workspace: d.max_in_flight_per_workspace,
            aging_interval_ms: d.aging_interval_ms,
            aging_boost: d.aging_boost,
            max_retries: d.max_retries,
            retry_delay_ms: d.retry_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BackpressureSettings {
    pub normal_top_k_rerank: usize,
    pub reduced_top_k_rerank: usize,
    pub slo_high_ms: u64,
    pub slo_recovery_ms: u64,
}

impl Default for BackpressureSettings {
    fn default() -> Self {
        let d = BackpressureConfig::default();
        Self {
            normal_top_k_rerank: d.normal_top_k_rerank,
            reduced_top_k_rerank: d.reduced_top_k_rerank,
            slo_high_ms: d.slo_high_ms,
            slo_recovery_ms: d.slo_recovery_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let config = WorkspaceConfig::load(Some("/nonexistent/path/does/not/exist")).unwrap();
        assert_eq!(config.chunk.max_tokens_per_passage, ChunkConfig::default().max_tokens_per_passage);
        assert_eq!(config.scheduler.max_retries, SchedulerConfig::default().max_retries);
    }
}

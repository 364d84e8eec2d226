//! Visibility Scheduler: turns a stream of `VisibilityEvent`s into ordered,
//! fairly-scheduled index-mutation work while preserving per-note FIFO,
//! cross-note fair share, bounded concurrency, aging, and bounded retry.
//!
//! The core selection logic in this module is deliberately synchronous and
//! driven by an explicit `now`, so it can be exercised deterministically in
//! tests without real timers or threads. [`crate::worker_pool`] supplies the
//! actual concurrency by driving this core from a small pool of OS threads.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use kv_core::{Error, VisibilityEvent};

use crate::stage::OperationStage;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_in_flight_per_note: usize,
    pub max_in_flight_per_workspace: usize,
    pub aging_interval_ms: i64,
    pub aging_boost: i64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub processing_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_note: 1,
            max_in_flight_per_workspace: 4,
            aging_interval_ms: 5_000,
            aging_boost: 10,
            max_retries: 3,
            retry_delay_ms: 200,
            processing_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("queue is full")]
    QueueFull,
    #[error("build stage failed: {0}")]
    BuildStageFailed(String),
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),
    #[error("commit stage failed: {0}")]
    CommitStageFailed(String),
    #[error("visibility timeout waiting for version {version_id}")]
    VisibilityTimeout { version_id: String },
    #[error("concurrent update conflict on note {note_id}")]
    ConcurrentUpdateConflict { note_id: String },
}

impl From<SchedulerError> for Error {
    fn from(e: SchedulerError) -> Self {
        Error::Internal(e.to_string())
    }
}

struct QueueItem {
    event: VisibilityEvent,
    priority: i64,
    submitted_at: DateTime<Utc>,
    attempts: u32,
}

/// A unit of work popped off the scheduler for processing. Must be resolved
/// with [`VisibilityScheduler::complete`] exactly once.
pub struct Reservation {
    note_id: String,
    item: QueueItem,
    started_at: DateTime<Utc>,
}

impl Reservation {
    pub fn event(&self) -> &VisibilityEvent {
        &self.item.event
    }

    /// How long this reservation has been outstanding as of `now`, in
    /// milliseconds. Used by the worker pool to detect an overrun build.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_milliseconds()
    }
}

#[derive(Default)]
struct QueueState {
    queues: HashMap<String, VecDeque<QueueItem>>,
    in_flight_per_note: HashMap<String, usize>,
    in_flight_total: usize,
    statuses: HashMap<String, OperationStage>,
}

pub struct VisibilityScheduler {
    config: SchedulerConfig,
    state: Mutex<QueueState>,
}

impl VisibilityScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Enqueue `event` at the tail of its note's queue.
    pub fn submit(&self, event: VisibilityEvent) {
        let mut state = self.state.lock().unwrap();
        let version_id = event.version_id.clone();
        let note_id = event.note_id.clone();
        let item = QueueItem {
            event,
            priority: 0,
            submitted_at: Utc::now(),
            attempts: 0,
        };
        state.queues.entry(note_id).or_default().push_back(item);
        state.statuses.insert(version_id, OperationStage::Queued);
    }

    pub fn status(&self, version_id: &str) -> Option<OperationStage> {
        self.state.lock().unwrap().statuses.get(version_id).copied()
    }

    pub fn processing_timeout_ms(&self) -> u64 {
        self.config.processing_timeout_ms
    }

    /// Write `next` as `version_id`'s status, validating the move against
    /// the FSM in [`crate::stage`]. An illegal transition is a scheduler bug
    /// rather than a condition callers can recover from, so it's logged
    /// rather than propagated; the write still happens so status lookups
    /// never go stale.
    fn transition(&self, state: &mut QueueState, version_id: &str, next: OperationStage) {
        if let Some(current) = state.statuses.get(version_id).copied() {
            if let Err(err) = crate::stage::validate_transition(current, next) {
                tracing::error!(version_id, %err, "scheduler made an illegal stage transition");
            }
        }
        state.statuses.insert(version_id.to_string(), next);
    }

    /// Mark a reservation's build stage complete (chunking/anchoring done,
    /// about to run the index health gate). Called by the indexing context
    /// between re-chunking and `InvertedIndex::commit`.
    pub fn mark_built(&self, version_id: &str) {
        let mut state = self.state.lock().unwrap();
        self.transition(&mut state, version_id, OperationStage::Built);
    }

    /// Mark a reservation as running its atomic index swap.
    pub fn mark_committing(&self, version_id: &str) {
        let mut state = self.state.lock().unwrap();
        self.transition(&mut state, version_id, OperationStage::Committing);
    }

    /// Apply the aging rule to every queue head: items waiting longer than
    /// `2 * aging_interval_ms` gain `+aging_boost` priority. Idempotent per
    /// item within one aging window is not enforced here; callers are
    /// expected to invoke this on a cadence of roughly `aging_interval_ms`.
    fn apply_aging(&self, state: &mut QueueState, now: DateTime<Utc>) {
        let threshold = chrono::Duration::milliseconds(2 * self.config.aging_interval_ms);
        for queue in state.queues.values_mut() {
            if let Some(head) = queue.front_mut() {
                if now - head.submitted_at > threshold {
                    head.priority += self.config.aging_boost;
                }
            }
        }
    }

    /// Select and reserve the next eligible item, applying the selection
    /// rule: among notes below their per-note in-flight cap with queued
    /// work, pick the highest-priority head item, breaking ties by oldest
    /// `submitted_at`, then by note id ascending. Notes are otherwise
    /// considered in round-robin (sorted note id) order when priorities
    /// tie exactly at zero aging.
    pub fn reserve_next(&self, now: DateTime<Utc>) -> Option<Reservation> {
        let mut state = self.state.lock().unwrap();
        if state.in_flight_total >= self.config.max_in_flight_per_workspace {
            return None;
        }
        self.apply_aging(&mut state, now);

        let mut eligible_notes: Vec<String> = state
            .queues
            .iter()
            .filter(|(note_id, queue)| {
                !queue.is_empty()
                    && *state.in_flight_per_note.get(*note_id).unwrap_or(&0) < self.config.max_in_flight_per_note
            })
            .map(|(note_id, _)| note_id.clone())
            .collect();
        eligible_notes.sort();

        let best_note = eligible_notes.into_iter().max_by(|a, b| {
            let head_a = state.queues[a].front().unwrap();
            let head_b = state.queues[b].front().unwrap();
            head_a
                .priority
                .cmp(&head_b.priority)
                .then_with(|| head_b.submitted_at.cmp(&head_a.submitted_at))
                .then_with(|| b.cmp(a))
        })?;

        let item = state.queues.get_mut(&best_note).unwrap().pop_front().unwrap();
        *state.in_flight_per_note.entry(best_note.clone()).or_insert(0) += 1;
        state.in_flight_total += 1;
        let version_id = item.event.version_id.clone();
        self.transition(&mut state, &version_id, OperationStage::Building);

        Some(Reservation { note_id: best_note, item, started_at: now })
    }

    /// Resolve a reservation. On success the item is marked `Committed`; on
    /// failure it is retried with jittered exponential backoff up to
    /// `max_retries`, after which it is marked `Failed`.
    pub fn complete(&self, mut reservation: Reservation, result: Result<(), SchedulerError>) {
        let mut state = self.state.lock().unwrap();
        let note_id = reservation.note_id.clone();
        *state.in_flight_per_note.entry(note_id.clone()).or_insert(1) -= 1;
        state.in_flight_total = state.in_flight_total.saturating_sub(1);

        let version_id = reservation.item.event.version_id.clone();
        match result {
            Ok(()) => {
                self.transition(&mut state, &version_id, OperationStage::Committed);
            }
            Err(_err) => {
                reservation.item.attempts += 1;
                // A retry must pass through `Failed` before `Queued` — there is
                // no direct Building/Committing -> Queued edge in the FSM.
                self.transition(&mut state, &version_id, OperationStage::Failed);
                if reservation.item.attempts <= self.config.max_retries {
                    self.transition(&mut state, &version_id, OperationStage::Queued);
                    state.queues.entry(note_id).or_default().push_back(reservation.item);
                }
            }
        }
    }

    /// Exponential backoff with +-20% jitter for retry attempt `attempt`
    /// (1-based), given a deterministic `jitter_fraction` in `[-1.0, 1.0]`
    /// supplied by the caller (production callers use a small RNG; tests
    /// pass fixed values for reproducibility).
    pub fn backoff_delay_ms(&self, attempt: u32, jitter_fraction: f64) -> u64 {
        let base = self.config.retry_delay_ms as f64 * 2f64.powi(attempt.saturating_sub(1) as i32);
        let jitter = base * 0.2 * jitter_fraction.clamp(-1.0, 1.0);
        (base + jitter).max(0.0) as u64
    }

    /// Cooperative shutdown: any item not yet `Committed` is marked
    /// `Failed`; already-committed work is left untouched.
    pub fn drain(&self) {
        let mut state = self.state.lock().unwrap();
        for queue in state.queues.values_mut() {
            queue.clear();
        }
        let committed_versions: Vec<String> = state
            .statuses
            .iter()
            .filter(|(_, stage)| **stage == OperationStage::Committed)
            .map(|(v, _)| v.clone())
            .collect();
        let failed: Vec<String> = state
            .statuses
            .keys()
            .filter(|v| !committed_versions.contains(v))
            .cloned()
            .collect();
        for v in failed {
            state.statuses.insert(v, OperationStage::Failed);
        }
    }
}

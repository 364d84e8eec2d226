//! Rolling-P95 latency tracker driving the SLO backpressure rule: once the
//! window's P95 exceeds `slo_high_ms`, reranking narrows to `reduced_top_k`
//! until P95 recovers below `slo_recovery_ms`.

use std::collections::VecDeque;
use std::sync::Mutex;

const WINDOW_SIZE: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct BackpressureConfig {
    pub normal_top_k_rerank: usize,
    pub reduced_top_k_rerank: usize,
    pub slo_high_ms: u64,
    pub slo_recovery_ms: u64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            normal_top_k_rerank: 64,
            reduced_top_k_rerank: 32,
            slo_high_ms: 500,
            slo_recovery_ms: 400,
        }
    }
}

struct State {
    latencies_ms: VecDeque<u64>,
    degraded: bool,
}

pub struct LatencyTracker {
    config: BackpressureConfig,
    state: Mutex<State>,
}

impl LatencyTracker {
    pub fn new(config: BackpressureConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State { latencies_ms: VecDeque::with_capacity(WINDOW_SIZE), degraded: false }),
        }
    }

    /// Effective `top_k_rerank` for the *next* query, reflecting the window
    /// as of the last recorded latency.
    pub fn current_top_k_rerank(&self) -> usize {
        let state = self.state.lock().unwrap();
        if state.degraded {
            self.config.reduced_top_k_rerank
        } else {
            self.config.normal_top_k_rerank
        }
    }

    pub fn record(&self, latency_ms: u64) {
        let mut state = self.state.lock().unwrap();
        if state.latencies_ms.len() == WINDOW_SIZE {
            state.latencies_ms.pop_front();
        }
        state.latencies_ms.push_back(latency_ms);

        let p95 = percentile(&state.latencies_ms, 0.95);
        if !state.degraded && p95 > self.config.slo_high_ms {
            state.degraded = true;
        } else if state.degraded && p95 < self.config.slo_recovery_ms {
            state.degraded = false;
        }
    }
}

fn percentile(samples: &VecDeque<u64>, p: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_normal_top_k() {
        let tracker = LatencyTracker::new(BackpressureConfig::default());
        assert_eq!(tracker.current_top_k_rerank(), 64);
    }

    #[test]
    fn high_p95_latency_reduces_top_k() {
        let tracker = LatencyTracker::new(BackpressureConfig::default());
        for _ in 0..100 {
            tracker.record(900);
        }
        assert_eq!(tracker.current_top_k_rerank(), 32);
    }

    #[test]
    fn recovery_restores_normal_top_k() {
        let tracker = LatencyTracker::new(BackpressureConfig::default());
        for _ in 0..100 {
            tracker.record(900);
        }
        assert_eq!(tracker.current_top_k_rerank(), 32);
        for _ in 0..WINDOW_SIZE {
            tracker.record(50);
        }
        assert_eq!(tracker.current_top_k_rerank(), 64);
    }
}

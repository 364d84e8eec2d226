//! Per-session token-bucket rate limiting (§5). Each category pairs a
//! short-window burst bucket with a longer-window sustained bucket; a
//! request is admitted only if both buckets have capacity, and each bucket
//! is decremented only when it itself admits the request — a bucket denied
//! by its sibling is left untouched.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use kv_core::Error;

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_ms: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_ms: f64) -> Self {
        Self { capacity, tokens: capacity, refill_per_ms, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_ms = now.duration_since(self.last_refill).as_millis() as f64;
        self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempt to take one token. Only mutates state when it succeeds.
    fn try_consume(&mut self, now: Instant) -> Result<(), u64> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err((deficit / self.refill_per_ms).ceil() as u64)
        }
    }
}

/// One burst/sustained pair, e.g. "queries burst 5 QPS / sustained 60/min".
pub struct RateLimitCategory {
    burst: Mutex<TokenBucket>,
    sustained: Mutex<TokenBucket>,
}

impl RateLimitCategory {
    pub fn new(burst_capacity: f64, burst_per_sec: f64, sustained_capacity: f64, sustained_per_min: f64) -> Self {
        Self {
            burst: Mutex::new(TokenBucket::new(burst_capacity, burst_per_sec / 1000.0)),
            sustained: Mutex::new(TokenBucket::new(sustained_capacity, sustained_per_min / 60_000.0)),
        }
    }

    pub fn check(&self) -> Result<(), Error> {
        let now = Instant::now();
        self.burst
            .lock()
            .unwrap()
            .try_consume(now)
            .map_err(|retry_after_ms| Error::RateLimitExceeded { retry_after_ms })?;
        self.sustained
            .lock()
            .unwrap()
            .try_consume(now)
            .map_err(|retry_after_ms| Error::RateLimitExceeded { retry_after_ms })
    }
}

pub struct RateLimiter {
    pub queries: RateLimitCategory,
    pub mutations: RateLimitCategory,
    pub draft_saves: RateLimitCategory,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            queries: RateLimitCategory::new(5.0, 5.0, 60.0, 60.0),
            mutations: RateLimitCategory::new(1.0, 0.2, 12.0, 12.0),
            draft_saves: RateLimitCategory::new(10.0, 10.0, 300.0, 300.0),
        }
    }
}

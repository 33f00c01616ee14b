//! Token-bucket rate limiting for outbound REST traffic.
//!
//! Refill is lazy - computed from elapsed time on each acquire, so an
//! idle venue costs no timer wakeups. The system never rejects traffic,
//! it only delays it.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use hermes_core::VenueId;

/// Venue-configured bucket parameters, derived from the venue's
/// documented rate limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Conservative fallback for venues without explicit configuration
        RateLimitConfig {
            capacity: 10,
            refill_per_sec: 10.0,
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Lazy-refill token bucket. `acquire` suspends the caller until a
/// token is available and always eventually succeeds.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        TokenBucket {
            capacity: f64::from(config.capacity),
            refill_per_sec: config.refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, suspending until one is available.
    ///
    /// Cancel-safe: a caller dropped while waiting has consumed nothing.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Time until one full token has accrued. Bounds starvation:
                // nobody waits longer than one refill interval past their turn.
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one token without waiting. Returns false if none available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available (diagnostic)
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

/// Per-venue bucket registry. All concurrent callers for a venue
/// contend on the same bucket.
pub struct RateLimiter {
    buckets: DashMap<VenueId, Arc<TokenBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            buckets: DashMap::new(),
        }
    }

    /// Install the bucket for a venue, replacing any existing one
    pub fn register(&self, venue: VenueId, config: RateLimitConfig) {
        self.buckets.insert(venue, Arc::new(TokenBucket::new(config)));
    }

    /// Acquire one token for the venue, suspending until available.
    /// Unregistered venues get a bucket with default parameters.
    pub async fn acquire(&self, venue: &VenueId) {
        let bucket = self.bucket(venue);
        bucket.acquire().await;
    }

    /// The venue's bucket, created with default parameters on first use
    pub fn bucket(&self, venue: &VenueId) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(venue) {
            return bucket.value().clone();
        }
        self.buckets
            .entry(venue.clone())
            .or_insert_with(|| Arc::new(TokenBucket::new(RateLimitConfig::default())))
            .value()
            .clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

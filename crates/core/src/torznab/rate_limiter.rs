//! Token bucket rate limiter, one bucket per indexer.
//!
//! Callers block until a token frees up. Waiters on the same indexer queue
//! on the bucket's mutex, so requests stay FIFO per indexer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Token bucket for a single indexer. Tokens refill at a constant rate and
/// are consumed per request.
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    /// Currently available tokens.
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    /// The bucket starts full, allowing an immediate burst up to capacity.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let wait_secs = tokens_needed / self.refill_rate;
            Err(Duration::from_secs_f32(wait_secs))
        }
    }

    /// Tokens currently available (refreshed).
    pub fn available(&mut self) -> f32 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Pool of rate limiters keyed by indexer id.
pub struct RateLimiterPool {
    limiters: HashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl RateLimiterPool {
    pub fn new(indexers: impl IntoIterator<Item = (String, u32)>) -> Self {
        let limiters = indexers
            .into_iter()
            .map(|(id, rpm)| (id, Arc::new(Mutex::new(TokenBucket::new(rpm)))))
            .collect();
        Self { limiters }
    }

    /// Block until a token is available for the indexer.
    ///
    /// Holding the bucket's mutex across the sleep keeps waiters FIFO.
    /// Returns `false` when the indexer is unknown.
    pub async fn acquire(&self, indexer: &str) -> bool {
        let Some(bucket) = self.limiters.get(indexer) else {
            return false;
        };
        let mut bucket = bucket.lock().await;
        loop {
            match bucket.try_acquire() {
                Ok(()) => return true,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    pub fn has_indexer(&self, indexer: &str) -> bool {
        self.limiters.contains_key(indexer)
    }
}

//! Shared coordination store.
//!
//! Rate-limit buckets, idempotency records and idempotency locks live in a
//! key-value store shared by every server instance. Redis is the production
//! backend; [`MemoryStore`] serves single-instance deployments and tests.
//!
//! Every operation that must be atomic across instances (lock acquisition,
//! owner-checked release, bucket refill-and-take) is a single store-side
//! operation, never a read-then-write from the client.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed value at {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Result of one token-bucket take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub allowed: bool,
    /// Tokens left after this take, possibly fractional.
    pub tokens: f64,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set `key` to `owner` only if absent, expiring after `ttl`.
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if it still holds `owner`. Returns whether it did.
    async fn unlock(&self, key: &str, owner: &str) -> Result<bool, StoreError>;

    /// Read a whole field map. `None` when the key is absent or expired.
    async fn read_record(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, StoreError>;

    /// Replace a field map and set its expiry in one atomic step.
    async fn write_record(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Refill the bucket at `key` for the time elapsed since its last
    /// update, then take one token if available. Idle buckets expire after
    /// `idle_ttl`.
    async fn take_token(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        now_ms: i64,
        idle_ttl: Duration,
    ) -> Result<BucketState, StoreError>;
}

/// Token bucket arithmetic shared by every backend.
///
/// The Redis backend runs the same steps in Lua; keep the two in sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    pub tokens: f64,
    pub updated_at_ms: i64,
}

impl TokenBucket {
    pub fn full(burst: u32, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(burst),
            updated_at_ms: now_ms,
        }
    }

    pub fn take(&mut self, rate_per_sec: f64, burst: u32, now_ms: i64) -> BucketState {
        let elapsed = (now_ms - self.updated_at_ms).max(0) as f64;
        self.tokens = (self.tokens + elapsed * rate_per_sec / 1000.0).min(f64::from(burst));
        self.updated_at_ms = self.updated_at_ms.max(now_ms);
        let allowed = self.tokens >= 1.0;
        if allowed {
            self.tokens -= 1.0;
        }
        BucketState {
            allowed,
            tokens: self.tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_refills_with_elapsed_time() {
        let mut bucket = TokenBucket::full(2, 0);
        assert!(bucket.take(1.0, 2, 0).allowed);
        assert!(bucket.take(1.0, 2, 0).allowed);
        assert!(!bucket.take(1.0, 2, 0).allowed);
        assert!(!bucket.take(1.0, 2, 999).allowed);
        assert!(bucket.take(1.0, 2, 1000).allowed);
    }

    #[test]
    fn test_bucket_caps_at_burst_and_ignores_clock_going_back() {
        let mut bucket = TokenBucket::full(3, 10_000);
        let state = bucket.take(100.0, 3, 1_000_000);
        assert_eq!(state.tokens, 2.0);
        let state = bucket.take(100.0, 3, 5_000);
        assert_eq!(state.tokens, 1.0);
        assert_eq!(bucket.updated_at_ms, 1_000_000);
    }
}

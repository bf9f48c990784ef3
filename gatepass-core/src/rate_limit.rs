//! Token-bucket admission control.
//!
//! Each class (see [`LimitClass`]) charges its own bucket family, keyed by
//! client identity. Bucket state lives in the shared [`KeyValueStore`] so
//! every server instance draws from the same buckets. When the store is
//! unreachable the limiter fails open.

use crate::config::{LimitClass, RateLimitPolicy, RateLimitsConfig};
use crate::coordination::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which a request is expected to be admitted again.
    pub reset_at: i64,
}

impl RateLimitDecision {
    /// Seconds until `reset_at`, at least one.
    pub fn retry_after_secs(&self, now_ms: i64) -> i64 {
        (self.reset_at - now_ms.div_euclid(1000)).max(1)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    class: LimitClass,
    policies: Arc<RwLock<RateLimitsConfig>>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        class: LimitClass,
        policies: Arc<RwLock<RateLimitsConfig>>,
    ) -> Self {
        Self {
            store,
            class,
            policies,
        }
    }

    pub fn class(&self) -> LimitClass {
        self.class
    }

    /// Charge one request for `client` against the current policy of this
    /// limiter's class.
    pub async fn allow(&self, client: &str) -> RateLimitDecision {
        let policy = self.policies.read().await.policy(self.class);
        self.allow_at(client, policy, now_millis()).await
    }

    pub async fn allow_at(
        &self,
        client: &str,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> RateLimitDecision {
        let key = bucket_key(self.class, client);
        match self
            .store
            .take_token(&key, policy.rate, policy.burst, now_ms, idle_ttl(policy))
            .await
        {
            Ok(state) => decide(policy, state.allowed, state.tokens, now_ms),
            Err(e) => {
                warn!(
                    class = %self.class,
                    error = %e,
                    "Rate limit store unavailable, admitting request"
                );
                RateLimitDecision {
                    allowed: true,
                    limit: policy.burst,
                    remaining: policy.burst,
                    reset_at: now_ms.div_euclid(1000) + 1,
                }
            }
        }
    }
}

pub fn bucket_key(class: LimitClass, client: &str) -> String {
    format!("ratelimit:{class}:{client}")
}

pub fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Long enough for an idle bucket to refill completely, plus a second.
fn idle_ttl(policy: RateLimitPolicy) -> Duration {
    let refill_secs = if policy.rate > 0.0 {
        (f64::from(policy.burst) / policy.rate).ceil()
    } else {
        0.0
    };
    Duration::from_secs_f64(refill_secs.min(86_400.0) + 1.0)
}

fn decide(policy: RateLimitPolicy, allowed: bool, tokens: f64, now_ms: i64) -> RateLimitDecision {
    let remaining = tokens.floor().clamp(0.0, f64::from(policy.burst)) as u32;
    let reset_at = if allowed || policy.rate <= 0.0 {
        now_ms.div_euclid(1000) + 1
    } else {
        let wait_ms = ((1.0 - tokens) / policy.rate * 1000.0).ceil() as i64;
        (now_ms + wait_ms.max(1) + 999).div_euclid(1000)
    };
    RateLimitDecision {
        allowed,
        limit: policy.burst,
        remaining,
        reset_at,
    }
}

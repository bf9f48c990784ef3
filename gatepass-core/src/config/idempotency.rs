use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// How long a completed response stays replayable.
    pub record_ttl: Duration,
    /// Upper bound on how long a crashed request can block its key.
    pub lock_ttl: Duration,
    /// Poll period while waiting on an in-flight duplicate.
    pub poll_interval: Duration,
    /// Give up waiting on an in-flight duplicate after this long.
    pub poll_timeout: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::from_secs(600),
            lock_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_secs(2),
        }
    }
}

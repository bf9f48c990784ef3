//! TOML file configuration structures.
//!
//! These structs directly map to the `gatepass-config.toml` file format.

use gatepass_core::config::{
    IdempotencyConfig as CoreIdempotency, RateLimitsConfig as CoreRateLimits,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    pub payment_gateway: PaymentGatewayConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Only enable behind a reverse proxy that sets `X-Forwarded-For`.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Venue local time as minutes east of UTC.
    #[serde(default)]
    pub venue_utc_offset_minutes: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            trust_forwarded_for: false,
            venue_utc_offset_minutes: 0,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Coordination store. Without a URL the server keeps rate-limit and
/// idempotency state in process memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Tokens added per second.
    pub rate: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_general")]
    pub general: RateLimitPolicy,
    #[serde(default = "default_check_in")]
    pub check_in: RateLimitPolicy,
    #[serde(default = "default_orders")]
    pub orders: RateLimitPolicy,
    #[serde(default = "default_webhook")]
    pub webhook: RateLimitPolicy,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            check_in: default_check_in(),
            orders: default_orders(),
            webhook: default_webhook(),
        }
    }
}

fn default_general() -> RateLimitPolicy {
    CoreRateLimits::default().general.into()
}

fn default_check_in() -> RateLimitPolicy {
    CoreRateLimits::default().check_in.into()
}

fn default_orders() -> RateLimitPolicy {
    CoreRateLimits::default().orders.into()
}

fn default_webhook() -> RateLimitPolicy {
    CoreRateLimits::default().webhook.into()
}

impl From<gatepass_core::config::RateLimitPolicy> for RateLimitPolicy {
    fn from(policy: gatepass_core::config::RateLimitPolicy) -> Self {
        Self {
            rate: policy.rate,
            burst: policy.burst,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    CoreIdempotency::default().record_ttl.as_secs()
}

fn default_lock_ttl_secs() -> u64 {
    CoreIdempotency::default().lock_ttl.as_secs()
}

fn default_poll_interval_ms() -> u64 {
    millis(CoreIdempotency::default().poll_interval)
}

fn default_poll_timeout_ms() -> u64 {
    millis(CoreIdempotency::default().poll_timeout)
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Payment gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatewayConfig {
    pub server_key: String,
    pub snap_base_url: Url,
    pub api_base_url: Url,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[admin]
secret = "test-secret"

[payment_gateway]
server_key = "SB-Mid-server-abc"
snap_base_url = "https://app.sandbox.midtrans.com/"
api_base_url = "https://api.sandbox.midtrans.com/"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(!config.server.trust_forwarded_for);
        assert!(config.redis.url.is_none());
        assert_eq!(config.rate_limits.check_in.burst, 10);
        assert_eq!(config.rate_limits.webhook.rate, 50.0);
        assert_eq!(config.idempotency.ttl_secs, 600);
        assert_eq!(config.idempotency.poll_timeout_ms, 2_000);
        assert!(!config.is_admin_secret_hashed());
    }

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
request_timeout_secs = 10
trust_forwarded_for = true
venue_utc_offset_minutes = 420

[admin]
secret = "$argon2id$v=19$m=19456,t=2,p=1$abc123"

[redis]
url = "redis://127.0.0.1:6379/"

[rate_limits.check_in]
rate = 20.0
burst = 40

[idempotency]
ttl_secs = 60

[payment_gateway]
server_key = "SB-Mid-server-abc"
snap_base_url = "https://app.sandbox.midtrans.com/"
api_base_url = "https://api.sandbox.midtrans.com/"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.venue_utc_offset_minutes, 420);
        assert_eq!(config.redis.url.as_deref(), Some("redis://127.0.0.1:6379/"));
        assert_eq!(config.rate_limits.check_in.burst, 40);
        // Sections not mentioned keep their defaults.
        assert_eq!(config.rate_limits.orders.burst, 5);
        assert_eq!(config.idempotency.ttl_secs, 60);
        assert_eq!(config.idempotency.lock_ttl_secs, 30);
        assert!(config.is_admin_secret_hashed());
    }
}

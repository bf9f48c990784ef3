//! Configuration module for gatepass-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{
    AdminConfig, IdempotencyConfig, LimitClass, PaymentGatewayConfig, RateLimitPolicy,
    RateLimitsConfig, ServerConfig, SharedConfig,
};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub rate_limits: RateLimitsConfig,
    pub idempotency: IdempotencyConfig,
    pub payment_gateway: PaymentGatewayConfig,
    /// Read once at startup; changing it requires a restart.
    pub redis_url: Option<String>,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(
            self.server,
            self.admin,
            self.rate_limits,
            self.idempotency,
            self.payment_gateway,
        )
    }

    /// Replace every reloadable section of `shared` with this configuration.
    pub async fn apply_to(self, shared: &SharedConfig) {
        *shared.server.write().await = self.server;
        *shared.admin.write().await = self.admin;
        *shared.rate_limits.write().await = self.rate_limits;
        *shared.idempotency.write().await = self.idempotency;
        *shared.payment_gateway.write().await = self.payment_gateway;
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        // Applied after the rewrite so the override never lands in the file.
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config, secret_hash)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.server.request_timeout_secs == 0 {
        return Err(invalid("server.request_timeout_secs must be positive"));
    }
    venue_offset(config.server.venue_utc_offset_minutes)?;

    let limits = &config.rate_limits;
    for (class, policy) in [
        (LimitClass::General, &limits.general),
        (LimitClass::CheckIn, &limits.check_in),
        (LimitClass::Orders, &limits.orders),
        (LimitClass::Webhook, &limits.webhook),
    ] {
        if !(policy.rate.is_finite() && policy.rate > 0.0) || policy.burst == 0 {
            return Err(invalid(format!(
                "rate_limits.{class} needs a positive rate and a burst of at least 1"
            )));
        }
    }

    let idem = &config.idempotency;
    if idem.ttl_secs == 0 || idem.lock_ttl_secs == 0 {
        return Err(invalid("idempotency ttls must be positive"));
    }
    if idem.poll_interval_ms == 0 || idem.poll_interval_ms > idem.poll_timeout_ms {
        return Err(invalid(
            "idempotency.poll_interval_ms must be positive and at most poll_timeout_ms",
        ));
    }

    let gateway = &config.payment_gateway;
    if gateway.server_key.trim().is_empty() {
        return Err(invalid("payment_gateway.server_key is empty"));
    }
    for (name, url) in [
        ("snap_base_url", &gateway.snap_base_url),
        ("api_base_url", &gateway.api_base_url),
    ] {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("payment_gateway.{name} must be http(s)")));
        }
        // Url::join drops the last segment of a base without a trailing slash.
        if !url.path().ends_with('/') {
            return Err(invalid(format!("payment_gateway.{name} must end with '/'")));
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Offsets in use anywhere in the world, UTC-12:00 through UTC+14:00.
const VENUE_OFFSET_MINUTES: std::ops::RangeInclusive<i32> = -12 * 60..=14 * 60;

fn venue_offset(minutes: i32) -> Result<UtcOffset, ConfigError> {
    if !VENUE_OFFSET_MINUTES.contains(&minutes) {
        return Err(invalid(
            "server.venue_utc_offset_minutes must be between -720 and 840",
        ));
    }
    UtcOffset::from_whole_seconds(minutes * 60)
        .map_err(|_| invalid("server.venue_utc_offset_minutes is out of range"))
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(
    file_config: FileConfig,
    secret_hash: String,
) -> Result<LoadedConfig, ConfigError> {
    let FileConfig {
        server,
        redis,
        rate_limits,
        idempotency,
        payment_gateway,
        ..
    } = file_config;

    let policy = |p: file::RateLimitPolicy| RateLimitPolicy::new(p.rate, p.burst);

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: server.listen,
            request_timeout: Duration::from_secs(server.request_timeout_secs),
            trust_forwarded_for: server.trust_forwarded_for,
            venue_utc_offset: venue_offset(server.venue_utc_offset_minutes)?,
        },
        admin: AdminConfig { secret_hash },
        rate_limits: RateLimitsConfig {
            general: policy(rate_limits.general),
            check_in: policy(rate_limits.check_in),
            orders: policy(rate_limits.orders),
            webhook: policy(rate_limits.webhook),
        },
        idempotency: IdempotencyConfig {
            record_ttl: Duration::from_secs(idempotency.ttl_secs),
            lock_ttl: Duration::from_secs(idempotency.lock_ttl_secs),
            poll_interval: Duration::from_millis(idempotency.poll_interval_ms),
            poll_timeout: Duration::from_millis(idempotency.poll_timeout_ms),
        },
        payment_gateway: PaymentGatewayConfig {
            server_key: payment_gateway.server_key.into_bytes().into_boxed_slice(),
            snap_base_url: payment_gateway.snap_base_url,
            api_base_url: payment_gateway.api_base_url,
        },
        redis_url: redis.url,
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

/// `REDIS_URL` from the environment wins over `[redis].url`.
pub fn get_redis_url(from_file: Option<String>) -> Option<String> {
    std::env::var("REDIS_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .or(from_file)
}

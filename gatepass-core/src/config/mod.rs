//! Configuration types for GatePass.
//!
//! These types represent the validated runtime configuration used by the server
//! and can be shared across crates. The actual config loading/parsing is handled
//! by the server crate.

mod admin;
mod gateway;
mod idempotency;
mod rate_limits;
mod server;

pub use admin::AdminConfig;
pub use gateway::PaymentGatewayConfig;
pub use idempotency::IdempotencyConfig;
pub use rate_limits::{LimitClass, RateLimitPolicy, RateLimitsConfig};
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
///
/// Consumers read the section they need on every use, so a reload takes
/// effect without restarting anything.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub admin: Arc<RwLock<AdminConfig>>,
    pub rate_limits: Arc<RwLock<RateLimitsConfig>>,
    pub idempotency: Arc<RwLock<IdempotencyConfig>>,
    pub payment_gateway: Arc<RwLock<PaymentGatewayConfig>>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        admin: AdminConfig,
        rate_limits: RateLimitsConfig,
        idempotency: IdempotencyConfig,
        payment_gateway: PaymentGatewayConfig,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            admin: Arc::new(RwLock::new(admin)),
            rate_limits: Arc::new(RwLock::new(rate_limits)),
            idempotency: Arc::new(RwLock::new(idempotency)),
            payment_gateway: Arc::new(RwLock::new(payment_gateway)),
        }
    }
}

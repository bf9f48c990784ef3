//! Runtime configuration re-exports.
//!
//! The validated config types live in `gatepass-core::config` so services
//! can read them directly; this module re-exports them for the server.

pub use gatepass_core::config::{
    AdminConfig, IdempotencyConfig, LimitClass, PaymentGatewayConfig, RateLimitPolicy,
    RateLimitsConfig, ServerConfig, SharedConfig,
};

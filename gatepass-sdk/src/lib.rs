//! Shared wire types for Gatepass.
//!
//! Everything a gate device, a dashboard or the payment gateway exchanges
//! with the server lives here: request/response DTOs, the stable error
//! codes clients branch on, header names, and the gateway webhook signature.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod codes;
pub mod headers;
pub mod objects;
pub mod signature;

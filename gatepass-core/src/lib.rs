#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod check_in;
pub mod config;
pub mod coordination;
pub mod entities;
pub mod events;
pub mod framework;
pub mod gate;
pub mod idempotency;
pub mod orders;
pub mod payments;
pub mod processors;
pub mod rate_limit;
pub mod ticket_generation;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

//! Events passed between the request path and background processors.
//!
//! # Event Flow
//!
//! 1. `WebhookReconciler` applies a transition into `paid` and emits `OrderPaid`
//! 2. `TicketIssuer` receives `OrderPaid` and generates the order's tickets
//!
//! Events carry identifiers rather than full data; processors re-fetch
//! current state from the database.

pub mod channels;
pub mod types;

pub use channels::{
    order_paid_channel, OrderPaidReceiver, OrderPaidSender, DEFAULT_CHANNEL_BUFFER,
};
pub use types::OrderPaid;

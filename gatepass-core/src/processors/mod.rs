//! Background processors.
//!
//! - `TicketIssuer`: Receives `OrderPaid`, generates the order's tickets

pub mod ticket_issuer;

pub use ticket_issuer::{IssueError, TicketIssuer};

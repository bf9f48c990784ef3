pub mod categories;
pub mod check_ins;
pub mod gates;
pub mod order_lines;
pub mod orders;
pub mod tickets;

#[cfg(test)]
mod postgres_tests;

use gatepass_sdk::objects::{
    CheckInStatus as SdkCheckInStatus, PaymentStatus as SdkPaymentStatus,
    TicketStatus as SdkTicketStatus,
};

/// Ticket (order item) lifecycle status.
///
/// This is the sqlx::Type version. For API/DTO use, see `gatepass_sdk::objects::TicketStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "ticket_status")]
pub enum TicketStatus {
    Unpaid,
    Paid,
    CheckedIn,
    Canceled,
    Refunded,
}

impl From<TicketStatus> for SdkTicketStatus {
    fn from(value: TicketStatus) -> Self {
        match value {
            TicketStatus::Unpaid => SdkTicketStatus::Unpaid,
            TicketStatus::Paid => SdkTicketStatus::Paid,
            TicketStatus::CheckedIn => SdkTicketStatus::CheckedIn,
            TicketStatus::Canceled => SdkTicketStatus::Canceled,
            TicketStatus::Refunded => SdkTicketStatus::Refunded,
        }
    }
}

/// Check-in record status.
///
/// This is the sqlx::Type version. For API/DTO use, see `gatepass_sdk::objects::CheckInStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "check_in_status")]
pub enum CheckInStatus {
    Success,
    Failed,
    Duplicate,
}

impl From<CheckInStatus> for SdkCheckInStatus {
    fn from(value: CheckInStatus) -> Self {
        match value {
            CheckInStatus::Success => SdkCheckInStatus::Success,
            CheckInStatus::Failed => SdkCheckInStatus::Failed,
            CheckInStatus::Duplicate => SdkCheckInStatus::Duplicate,
        }
    }
}

/// Order payment status.
///
/// This is the sqlx::Type version. For API/DTO use, see `gatepass_sdk::objects::PaymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "payment_status")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    /// States an order may be in for a transition to `self` to be applied.
    ///
    /// Nothing moves back to `Unpaid`, and `Paid` only ever moves forward to
    /// `Refunded`. A failed attempt can still be paid by a later retry.
    pub fn legal_predecessors(self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Unpaid => &[],
            PaymentStatus::Paid => &[PaymentStatus::Unpaid, PaymentStatus::Failed],
            PaymentStatus::Failed => &[PaymentStatus::Unpaid],
            PaymentStatus::Canceled => &[PaymentStatus::Unpaid, PaymentStatus::Failed],
            PaymentStatus::Refunded => &[PaymentStatus::Paid],
        }
    }

    pub fn can_transition_to(self, target: PaymentStatus) -> bool {
        target.legal_predecessors().contains(&self)
    }
}

impl From<PaymentStatus> for SdkPaymentStatus {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Unpaid => SdkPaymentStatus::Unpaid,
            PaymentStatus::Paid => SdkPaymentStatus::Paid,
            PaymentStatus::Failed => SdkPaymentStatus::Failed,
            PaymentStatus::Canceled => SdkPaymentStatus::Canceled,
            PaymentStatus::Refunded => SdkPaymentStatus::Refunded,
        }
    }
}

//! Stable, machine-readable error codes.
//!
//! Gate devices and dashboards render a specific message per code, so the
//! serialized spelling of every variant is part of the public contract.

use serde::{Deserialize, Serialize};

/// Why a check-in was refused.
///
/// `DuplicateCheckIn` is not a failure of the system: it is the correct
/// detection of a second scan (or a lost race) for an already redeemed ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInErrorCode {
    InvalidQrCode,
    TicketNotPaid,
    DuplicateCheckIn,
    GateNotFound,
    GateInactive,
    GateStaffNotAssigned,
    GateCapacityExceeded,
    VipGateRequired,
}

impl CheckInErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInErrorCode::InvalidQrCode => "INVALID_QR_CODE",
            CheckInErrorCode::TicketNotPaid => "TICKET_NOT_PAID",
            CheckInErrorCode::DuplicateCheckIn => "DUPLICATE_CHECK_IN",
            CheckInErrorCode::GateNotFound => "GATE_NOT_FOUND",
            CheckInErrorCode::GateInactive => "GATE_INACTIVE",
            CheckInErrorCode::GateStaffNotAssigned => "GATE_STAFF_NOT_ASSIGNED",
            CheckInErrorCode::GateCapacityExceeded => "GATE_CAPACITY_EXCEEDED",
            CheckInErrorCode::VipGateRequired => "VIP_GATE_REQUIRED",
        }
    }

    /// Default human-readable message shown on the scanning device.
    pub fn message(&self) -> &'static str {
        match self {
            CheckInErrorCode::InvalidQrCode => "ticket not found",
            CheckInErrorCode::TicketNotPaid => "ticket is not in a redeemable state",
            CheckInErrorCode::DuplicateCheckIn => "ticket already checked in",
            CheckInErrorCode::GateNotFound => "gate not found",
            CheckInErrorCode::GateInactive => "gate is not active",
            CheckInErrorCode::GateStaffNotAssigned => "staff is not assigned to this gate",
            CheckInErrorCode::GateCapacityExceeded => "gate capacity reached for today",
            CheckInErrorCode::VipGateRequired => "VIP ticket must enter through a VIP gate",
        }
    }
}

impl std::fmt::Display for CheckInErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes for everything that is not a check-in outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    RateLimited,
    IdempotencyKeyReused,
    IdempotencyInProgress,
    RequestTimeout,
    Unauthorized,
    Forbidden,
    InvalidRequest,
    OrderNotFound,
    OrderNotPaid,
    OrderNotPayable,
    TicketsAlreadyGenerated,
    CategoryNotFound,
    GateNotFound,
    PaymentGatewayUnavailable,
    InternalError,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorCode::RateLimited => "RATE_LIMITED",
            ApiErrorCode::IdempotencyKeyReused => "IDEMPOTENCY_KEY_REUSED",
            ApiErrorCode::IdempotencyInProgress => "IDEMPOTENCY_IN_PROGRESS",
            ApiErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ApiErrorCode::Unauthorized => "UNAUTHORIZED",
            ApiErrorCode::Forbidden => "FORBIDDEN",
            ApiErrorCode::InvalidRequest => "INVALID_REQUEST",
            ApiErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ApiErrorCode::OrderNotPaid => "ORDER_NOT_PAID",
            ApiErrorCode::OrderNotPayable => "ORDER_NOT_PAYABLE",
            ApiErrorCode::TicketsAlreadyGenerated => "TICKETS_ALREADY_GENERATED",
            ApiErrorCode::CategoryNotFound => "CATEGORY_NOT_FOUND",
            ApiErrorCode::GateNotFound => "GATE_NOT_FOUND",
            ApiErrorCode::PaymentGatewayUnavailable => "PAYMENT_GATEWAY_UNAVAILABLE",
            ApiErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_spelling_matches_as_str() {
        let codes = [
            CheckInErrorCode::InvalidQrCode,
            CheckInErrorCode::TicketNotPaid,
            CheckInErrorCode::DuplicateCheckIn,
            CheckInErrorCode::GateNotFound,
            CheckInErrorCode::GateInactive,
            CheckInErrorCode::GateStaffNotAssigned,
            CheckInErrorCode::GateCapacityExceeded,
            CheckInErrorCode::VipGateRequired,
        ];
        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }

        let json = serde_json::to_string(&ApiErrorCode::IdempotencyKeyReused).unwrap();
        assert_eq!(json, "\"IDEMPOTENCY_KEY_REUSED\"");
    }
}

pub mod check_in;
pub mod gates;
pub mod orders;
pub mod webhook;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codes::ApiErrorCode;

/// Name of the envelope field refreshed when a cached response is replayed.
pub const ENVELOPE_REQUEST_ID_FIELD: &str = "request_id";

/// Name of the envelope field refreshed when a cached response is replayed.
pub const ENVELOPE_TIMESTAMP_FIELD: &str = "timestamp";

/// Standard response envelope for every non-webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub request_id: Uuid,
    pub timestamp: i64,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            request_id: Uuid::new_v4(),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

impl Envelope<()> {
    pub fn error(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
            request_id: Uuid::new_v4(),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

/// Error payload carried by [`Envelope::error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ApiErrorCode,
    pub message: String,
}

/// Ticket lifecycle status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `gatepass-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Unpaid,
    Paid,
    CheckedIn,
    Canceled,
    Refunded,
}

/// Check-in record status for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Success,
    Failed,
    Duplicate,
}

/// Order payment status for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Canceled,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "unpaid"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Canceled => write!(f, "canceled"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

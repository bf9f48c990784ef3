//! Check-in request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CheckInStatus, TicketStatus};
use crate::codes::CheckInErrorCode;

/// Body of `POST /api/check-in` and `POST /api/gates/{gate_id}/check-in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub qr_code: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Result of a scan, returned for every outcome.
///
/// `error_code` is `None` exactly when `success` is true. For
/// `DUPLICATE_CHECK_IN` the record of the earlier (winning) check-in is
/// attached so the device can show when and where the ticket was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<CheckInErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<CheckInView>,
}

/// A check-in record with the related ticket, category and staff, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInView {
    pub id: Uuid,
    pub status: CheckInStatus,
    pub checked_in_at: i64,
    pub gate_id: Option<Uuid>,
    pub staff_id: Uuid,
    pub location: Option<String>,
    pub ticket: TicketView,
}

/// Ticket summary embedded in [`CheckInView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub qr_code: String,
    pub status: TicketStatus,
    pub category_id: Uuid,
    pub category_name: String,
    pub category_is_vip: bool,
}

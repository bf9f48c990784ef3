//! Gate administration types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned by `PUT` and `DELETE /api/admin/gates/{gate_id}/staff/{staff_id}`.
///
/// `changed` is false when the assignment already had the requested state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStaffResponse {
    pub gate_id: Uuid,
    pub staff_id: Uuid,
    pub assigned: bool,
    pub changed: bool,
}

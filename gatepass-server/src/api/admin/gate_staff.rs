use axum::{Json, extract::State};
use gatepass_core::entities::gates::{
    AssignGateStaff, GetGateById, IsStaffAssigned, UnassignGateStaff,
};
use gatepass_sdk::objects::Envelope;
use gatepass_sdk::objects::gates::GateStaffResponse;
use kanau::processor::Processor;
use uuid::Uuid;

use crate::api::ApiPath;
use crate::api::error::ApiError;
use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `PUT /api/admin/gates/{gate_id}/staff/{staff_id}`: allow a staff member
/// to scan at a gate. Assigning twice is not an error.
pub async fn assign_staff(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath((gate_id, staff_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Envelope<GateStaffResponse>>, ApiError> {
    ensure_gate(&state, gate_id).await?;

    let already = state
        .db
        .process(IsStaffAssigned { gate_id, staff_id })
        .await?;
    if !already {
        state
            .db
            .process(AssignGateStaff { gate_id, staff_id })
            .await?;
        tracing::info!(gate_id = %gate_id, staff_id = %staff_id, admin_id = %admin.user_id, "Staff assigned to gate");
    }

    Ok(Json(Envelope::data(GateStaffResponse {
        gate_id,
        staff_id,
        assigned: true,
        changed: !already,
    })))
}

/// `DELETE /api/admin/gates/{gate_id}/staff/{staff_id}`
pub async fn unassign_staff(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath((gate_id, staff_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Envelope<GateStaffResponse>>, ApiError> {
    ensure_gate(&state, gate_id).await?;

    let removed = state
        .db
        .process(UnassignGateStaff { gate_id, staff_id })
        .await?;
    if removed {
        tracing::info!(gate_id = %gate_id, staff_id = %staff_id, admin_id = %admin.user_id, "Staff removed from gate");
    }

    Ok(Json(Envelope::data(GateStaffResponse {
        gate_id,
        staff_id,
        assigned: false,
        changed: removed,
    })))
}

async fn ensure_gate(state: &AppState, gate_id: Uuid) -> Result<(), ApiError> {
    state
        .db
        .process(GetGateById { gate_id })
        .await?
        .map(|_| ())
        .ok_or(ApiError::GateNotFound)
}

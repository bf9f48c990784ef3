//! Check-in API handlers.
//!
//! # Endpoints
//!
//! - `POST /api/check-in`                 – redeem a ticket anywhere
//! - `POST /api/gates/{gate_id}/check-in` – redeem a ticket at a specific gate
//!
//! Both answer with a `CheckInResponse` for every outcome; the HTTP status
//! tells success, duplicate and refusal apart.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::post,
};
use gatepass_core::check_in::{CheckInCommand, CheckInOutcome};
use gatepass_core::config::LimitClass;
use gatepass_core::gate::GateCheckInCommand;
use gatepass_sdk::codes::CheckInErrorCode;
use gatepass_sdk::headers::IDEMPOTENCY_KEY_HEADER;
use gatepass_sdk::objects::Envelope;
use gatepass_sdk::objects::check_in::CheckInRequest;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::{Actor, ClientInfo};
use crate::api::middleware::{idempotency, rate_limit};
use crate::api::{ApiJson, ApiPath};
use crate::state::AppState;

const MAX_QR_CODE_LEN: usize = 128;
const MAX_LOCATION_LEN: usize = 255;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/check-in", post(check_in))
        .route("/api/gates/{gate_id}/check-in", post(gate_check_in))
        .route_layer(from_fn_with_state(
            state.idempotency_guard(&[IDEMPOTENCY_KEY_HEADER]),
            idempotency,
        ))
        .route_layer(from_fn_with_state(
            state.rate_limit_guard(LimitClass::CheckIn),
            rate_limit,
        ))
}

async fn check_in(
    State(state): State<AppState>,
    actor: Actor,
    client: ClientInfo,
    ApiJson(request): ApiJson<CheckInRequest>,
) -> Result<Response, ApiError> {
    actor.require_staff()?;
    let (qr_code, location) = validate(request)?;

    let outcome = state
        .check_ins
        .check_in(CheckInCommand {
            qr_code,
            staff_id: actor.user_id,
            gate_id: None,
            location,
            client_ip: Some(client.addr),
            user_agent: client.user_agent,
        })
        .await?;
    Ok(render(outcome))
}

async fn gate_check_in(
    State(state): State<AppState>,
    actor: Actor,
    client: ClientInfo,
    ApiPath(gate_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<CheckInRequest>,
) -> Result<Response, ApiError> {
    actor.require_staff()?;
    let (qr_code, location) = validate(request)?;
    let venue_offset = state.config.server.read().await.venue_utc_offset;

    let outcome = state
        .gates
        .check_in(
            GateCheckInCommand {
                gate_id,
                qr_code,
                staff_id: actor.user_id,
                is_admin: actor.is_admin(),
                location,
                client_ip: Some(client.addr),
                user_agent: client.user_agent,
            },
            venue_offset,
        )
        .await?;
    Ok(render(outcome))
}

fn validate(request: CheckInRequest) -> Result<(String, Option<String>), ApiError> {
    let qr_code = request.qr_code.trim();
    if qr_code.is_empty() || qr_code.len() > MAX_QR_CODE_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "qr_code must be 1 to {MAX_QR_CODE_LEN} characters"
        )));
    }
    let location = request
        .location
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());
    if location.as_ref().is_some_and(|l| l.len() > MAX_LOCATION_LEN) {
        return Err(ApiError::InvalidRequest(format!(
            "location must be at most {MAX_LOCATION_LEN} characters"
        )));
    }
    Ok((qr_code.to_string(), location))
}

pub fn outcome_status(code: Option<CheckInErrorCode>) -> StatusCode {
    match code {
        None => StatusCode::CREATED,
        Some(CheckInErrorCode::DuplicateCheckIn) => StatusCode::CONFLICT,
        Some(CheckInErrorCode::InvalidQrCode | CheckInErrorCode::GateNotFound) => {
            StatusCode::NOT_FOUND
        }
        Some(CheckInErrorCode::TicketNotPaid) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(
            CheckInErrorCode::GateInactive
            | CheckInErrorCode::GateStaffNotAssigned
            | CheckInErrorCode::VipGateRequired,
        ) => StatusCode::FORBIDDEN,
        Some(CheckInErrorCode::GateCapacityExceeded) => StatusCode::CONFLICT,
    }
}

fn render(outcome: CheckInOutcome) -> Response {
    let status = outcome_status(outcome.error_code());
    (status, Json(Envelope::data(outcome.into_response()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status() {
        assert_eq!(outcome_status(None), StatusCode::CREATED);
        assert_eq!(
            outcome_status(Some(CheckInErrorCode::DuplicateCheckIn)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            outcome_status(Some(CheckInErrorCode::InvalidQrCode)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            outcome_status(Some(CheckInErrorCode::TicketNotPaid)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            outcome_status(Some(CheckInErrorCode::VipGateRequired)),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_validate_trims_and_bounds() {
        let (qr, location) = validate(CheckInRequest {
            qr_code: "  QR-abc123 ".to_string(),
            location: Some("   ".to_string()),
        })
        .unwrap();
        assert_eq!(qr, "QR-abc123");
        assert_eq!(location, None);

        assert!(validate(CheckInRequest {
            qr_code: " ".to_string(),
            location: None,
        })
        .is_err());
        assert!(validate(CheckInRequest {
            qr_code: "Q".repeat(MAX_QR_CODE_LEN + 1),
            location: None,
        })
        .is_err());
    }
}

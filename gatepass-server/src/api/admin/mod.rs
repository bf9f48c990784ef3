//! Admin API handlers.
//!
//! These endpoints require an `admin` actor and the
//! `Gatepass-Admin-Authorization` header with the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `POST   /api/admin/orders/{order_id}/tickets`          – generate tickets for a paid order
//! - `POST   /api/admin/orders/{order_id}/payment/sync`     – pull payment status from the gateway
//! - `PUT    /api/admin/gates/{gate_id}/staff/{staff_id}`   – assign staff to a gate
//! - `DELETE /api/admin/gates/{gate_id}/staff/{staff_id}`   – unassign staff from a gate

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{post, put},
};
use gatepass_core::config::LimitClass;
use gatepass_sdk::headers::IDEMPOTENCY_KEY_HEADER;

use crate::api::middleware::{idempotency, rate_limit};
use crate::state::AppState;

mod gate_staff;
mod generate_tickets;
mod sync_payment;

/// Build the Admin API router.
pub fn router(state: &AppState) -> Router<AppState> {
    let generation = Router::new()
        .route(
            "/api/admin/orders/{order_id}/tickets",
            post(generate_tickets::generate_tickets),
        )
        .route_layer(from_fn_with_state(
            state.idempotency_guard(&[IDEMPOTENCY_KEY_HEADER]),
            idempotency,
        ));

    Router::new()
        .route(
            "/api/admin/orders/{order_id}/payment/sync",
            post(sync_payment::sync_payment),
        )
        .route(
            "/api/admin/gates/{gate_id}/staff/{staff_id}",
            put(gate_staff::assign_staff).delete(gate_staff::unassign_staff),
        )
        .merge(generation)
        .route_layer(from_fn_with_state(
            state.rate_limit_guard(LimitClass::General),
            rate_limit,
        ))
}

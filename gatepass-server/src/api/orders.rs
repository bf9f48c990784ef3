//! Guest order handlers.
//!
//! # Endpoints
//!
//! - `POST /api/orders`                    – place an order
//! - `GET  /api/orders/{order_id}`         – order status, owner or admin only
//! - `POST /api/orders/{order_id}/payment` – open a payment gateway session

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use gatepass_core::config::LimitClass;
use gatepass_core::entities::orders::OrderRecord;
use gatepass_core::orders::RequestedLine;
use gatepass_core::utils::clock;
use gatepass_sdk::headers::{IDEMPOTENCY_KEY_HEADER, ORDER_IDEMPOTENCY_KEY_HEADER};
use gatepass_sdk::objects::Envelope;
use gatepass_sdk::objects::orders::{CreateOrderRequest, OrderResponse, PaymentSessionResponse};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::Actor;
use crate::api::middleware::{idempotency, rate_limit};
use crate::api::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let create = Router::new()
        .route("/api/orders", post(create_order))
        .route_layer(from_fn_with_state(
            state.idempotency_guard(&[IDEMPOTENCY_KEY_HEADER, ORDER_IDEMPOTENCY_KEY_HEADER]),
            idempotency,
        ))
        .route_layer(from_fn_with_state(
            state.rate_limit_guard(LimitClass::Orders),
            rate_limit,
        ));

    let payment = Router::new()
        .route("/api/orders/{order_id}/payment", post(create_payment))
        .route_layer(from_fn_with_state(
            state.idempotency_guard(&[IDEMPOTENCY_KEY_HEADER]),
            idempotency,
        ))
        .route_layer(from_fn_with_state(
            state.rate_limit_guard(LimitClass::Orders),
            rate_limit,
        ));

    let status = Router::new()
        .route("/api/orders/{order_id}", get(get_order))
        .route_layer(from_fn_with_state(
            state.rate_limit_guard(LimitClass::General),
            rate_limit,
        ));

    create.merge(payment).merge(status)
}

/// Convert an `OrderRecord` (DB model) into an `OrderResponse` (API model).
pub(crate) fn to_response(record: &OrderRecord) -> OrderResponse {
    OrderResponse {
        order_id: record.id,
        user_id: record.user_id,
        payment_status: record.payment_status.into(),
        total_amount: record.total_amount,
        gateway_reference: record.gateway_reference.clone(),
        created_at: clock::unix_seconds(record.created_at),
    }
}

async fn create_order(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Envelope<OrderResponse>>), ApiError> {
    let lines: Vec<RequestedLine> = request
        .lines
        .iter()
        .map(|line| RequestedLine {
            category_id: line.category_id,
            quantity: line.quantity,
        })
        .collect();

    let order = state.orders.place_order(actor.user_id, &lines).await?;
    Ok((StatusCode::CREATED, Json(Envelope::data(to_response(&order)))))
}

async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(order_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<OrderResponse>>, ApiError> {
    // Someone else's order is reported as missing.
    let order = state
        .orders
        .find_order(order_id)
        .await?
        .filter(|o| o.user_id == actor.user_id || actor.is_admin())
        .ok_or(ApiError::OrderNotFound)?;
    Ok(Json(Envelope::data(to_response(&order))))
}

async fn create_payment(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(order_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<PaymentSessionResponse>>, ApiError> {
    let config = state.config.payment_gateway.read().await.clone();
    let (order, session) = state
        .payments
        .initiate(order_id, actor.user_id, &config)
        .await?;

    Ok(Json(Envelope::data(PaymentSessionResponse {
        order_id: order.id,
        gateway_reference: order.gateway_reference,
        token: session.token,
        redirect_url: session.redirect_url,
    })))
}

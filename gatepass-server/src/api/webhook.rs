//! Payment gateway notification endpoint.
//!
//! `POST /webhooks/payment` always answers `200 {"status":"ok"}`, whatever
//! happened internally: the gateway retries anything else, and a bad
//! signature or unknown order will not improve on retry. The route sits
//! outside the request deadline; reconciliation runs on its own task and
//! the acknowledgement waits for it at most `request_timeout`.

use axum::{Json, Router, extract::State, middleware::from_fn_with_state, routing::post};
use bytes::Bytes;
use gatepass_core::config::LimitClass;
use gatepass_sdk::objects::webhook::{GatewayNotification, WebhookAck};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::api::middleware::rate_limit;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/webhooks/payment", post(payment_notification))
        .route_layer(from_fn_with_state(
            state.rate_limit_guard(LimitClass::Webhook),
            rate_limit,
        ))
}

async fn payment_notification(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    let notification = match serde_json::from_slice::<GatewayNotification>(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed payment notification");
            return Json(WebhookAck::ok());
        }
    };
    let limit = state.config.server.read().await.request_timeout;
    let server_key = state.config.payment_gateway.read().await.server_key.clone();
    let reconciler = state.reconciler.clone();

    wait_at_most(limit, async move {
        let outcome = reconciler.handle(&notification, &server_key).await;
        debug!(reference = %notification.order_id, outcome = ?outcome, "Payment notification handled");
    })
    .await;
    Json(WebhookAck::ok())
}

/// Spawn `work` and wait for it for up to `limit`. The task is never
/// cancelled; past the limit it keeps running in the background.
async fn wait_at_most<F>(limit: Duration, work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::spawn(work)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Payment notification task failed"),
        Err(_) => warn!(
            limit_ms = limit.as_millis() as u64,
            "Payment notification still being applied, acknowledging now"
        ),
    }
}

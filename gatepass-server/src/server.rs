//! Axum server setup and router configuration.

use crate::api;
use crate::api::middleware::deadline;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, middleware::from_fn_with_state, response::IntoResponse, routing::get};
use gatepass_sdk::objects::Envelope;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
///
/// The payment webhook is merged after the deadline layer: it must always
/// acknowledge, and bounds its own wait.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::check_in::router(&state))
        .merge(api::orders::router(&state))
        .merge(api::admin::router(&state))
        .layer(from_fn_with_state(state.config.server.clone(), deadline))
        .merge(api::webhook::router(&state))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(Envelope::data(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

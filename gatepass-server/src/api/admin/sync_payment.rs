use axum::{Json, extract::State};
use gatepass_core::payments::ReconcileOutcome;
use gatepass_sdk::objects::Envelope;
use gatepass_sdk::objects::orders::PaymentSyncResponse;
use uuid::Uuid;

use crate::api::ApiPath;
use crate::api::error::ApiError;
use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `POST /api/admin/orders/{order_id}/payment/sync`: apply the gateway's
/// current transaction status as if its notification had arrived.
///
/// A resulting transition into `paid` issues tickets exactly like the
/// webhook does.
pub async fn sync_payment(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(order_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<PaymentSyncResponse>>, ApiError> {
    let config = state.config.payment_gateway.read().await.clone();
    let outcome = state
        .reconciler
        .resync(state.gateway.as_ref(), &config, order_id)
        .await
        .map_err(ApiError::PaymentGateway)?;
    tracing::info!(order_id = %order_id, admin_id = %admin.user_id, outcome = ?outcome, "Payment status resynced");

    let changed = match outcome {
        ReconcileOutcome::UnknownOrder => return Err(ApiError::OrderNotFound),
        ReconcileOutcome::SignatureRejected => return Err(ApiError::UntrustedGatewayResponse),
        ReconcileOutcome::Failed => {
            return Err(ApiError::Internal("payment resync failed".to_string()));
        }
        ReconcileOutcome::Transitioned { .. } => true,
        ReconcileOutcome::IgnoredStatus
        | ReconcileOutcome::AmountMismatch { .. }
        | ReconcileOutcome::Unchanged { .. } => false,
    };

    let order = state
        .orders
        .find_order(order_id)
        .await?
        .ok_or(ApiError::OrderNotFound)?;
    Ok(Json(Envelope::data(PaymentSyncResponse {
        order_id,
        payment_status: order.payment_status.into(),
        changed,
    })))
}

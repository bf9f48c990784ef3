use super::gateway::{GatewayError, PaymentGateway, PaymentSession, TransactionRequest};
use crate::config::PaymentGatewayConfig;
use crate::entities::orders::OrderRecord;
use crate::entities::PaymentStatus;
use crate::orders::OrderLedger;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InitiationError {
    /// Also returned when the order belongs to someone else.
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
    #[error("order {order_id} is {status:?} and cannot be paid")]
    OrderNotPayable {
        order_id: Uuid,
        status: PaymentStatus,
    },
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct PaymentInitiator {
    orders: Arc<dyn OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentInitiator {
    pub fn new(orders: Arc<dyn OrderLedger>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { orders, gateway }
    }

    /// Open a gateway payment session for an unpaid order owned by `user_id`.
    pub async fn initiate(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        config: &PaymentGatewayConfig,
    ) -> Result<(OrderRecord, PaymentSession), InitiationError> {
        let order = self
            .orders
            .find_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(InitiationError::OrderNotFound(order_id))?;
        if order.payment_status != PaymentStatus::Unpaid {
            return Err(InitiationError::OrderNotPayable {
                order_id,
                status: order.payment_status,
            });
        }
        let session = self
            .gateway
            .create_transaction(
                config,
                &TransactionRequest {
                    gateway_reference: order.gateway_reference.clone(),
                    gross_amount: order.total_amount,
                },
            )
            .await?;
        info!(order_id = %order.id, reference = %order.gateway_reference, "Payment session created");
        Ok((order, session))
    }
}

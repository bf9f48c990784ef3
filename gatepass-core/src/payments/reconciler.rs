//! Applying payment gateway notifications.
//!
//! Notifications can arrive late, out of order and repeatedly. Each one is
//! verified, mapped to a target payment status and applied with a
//! conditional update that only matches the target's legal predecessor
//! states, so replays and stale notifications change nothing. Only the
//! update that actually moves an order into `paid` emits [`OrderPaid`].

use super::gateway::{GatewayError, PaymentGateway};
use crate::config::PaymentGatewayConfig;
use crate::entities::PaymentStatus;
use crate::events::{OrderPaid, OrderPaidSender};
use crate::orders::OrderLedger;
use gatepass_sdk::objects::webhook::GatewayNotification;
use gatepass_sdk::signature::verify_notification;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Map a gateway transaction status to the payment status it implies.
///
/// `None` means the notification carries no actionable status.
pub fn map_gateway_status(
    transaction_status: &str,
    fraud_status: Option<&str>,
) -> Option<PaymentStatus> {
    match transaction_status {
        "settlement" => Some(PaymentStatus::Paid),
        "capture" => match fraud_status {
            None | Some("accept") => Some(PaymentStatus::Paid),
            Some(_) => None,
        },
        "pending" => Some(PaymentStatus::Unpaid),
        "deny" => Some(PaymentStatus::Failed),
        "cancel" | "expire" => Some(PaymentStatus::Canceled),
        "refund" | "partial_refund" | "chargeback" | "partial_chargeback" => {
            Some(PaymentStatus::Refunded)
        }
        _ => None,
    }
}

/// What handling a notification did. Never surfaced to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    SignatureRejected,
    UnknownOrder,
    IgnoredStatus,
    AmountMismatch { order_id: Uuid },
    /// Already in the target state, or the target is not reachable from
    /// the current one.
    Unchanged { order_id: Uuid, status: PaymentStatus },
    Transitioned { order_id: Uuid, from: PaymentStatus, to: PaymentStatus },
    Failed,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    orders: Arc<dyn OrderLedger>,
    order_paid_tx: OrderPaidSender,
}

impl WebhookReconciler {
    pub fn new(orders: Arc<dyn OrderLedger>, order_paid_tx: OrderPaidSender) -> Self {
        Self {
            orders,
            order_paid_tx,
        }
    }

    /// Verify and apply one notification. Errors are logged, never returned.
    pub async fn handle(
        &self,
        notification: &GatewayNotification,
        server_key: &[u8],
    ) -> ReconcileOutcome {
        if let Err(e) = verify_notification(notification, server_key) {
            warn!(reference = %notification.order_id, error = %e, "Dropping notification with bad signature");
            return ReconcileOutcome::SignatureRejected;
        }
        match self.apply(notification).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(reference = %notification.order_id, error = %e, "Failed to apply payment notification");
                ReconcileOutcome::Failed
            }
        }
    }

    /// Pull the current status of an order from the gateway and apply it
    /// like a notification. Recovers from lost notifications.
    pub async fn resync(
        &self,
        gateway: &dyn PaymentGateway,
        config: &PaymentGatewayConfig,
        order_id: Uuid,
    ) -> Result<ReconcileOutcome, GatewayError> {
        let order = match self.orders.find_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return Ok(ReconcileOutcome::UnknownOrder),
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Failed to load order for resync");
                return Ok(ReconcileOutcome::Failed);
            }
        };
        let status = gateway
            .transaction_status(config, &order.gateway_reference)
            .await?;
        Ok(self.handle(&status, &config.server_key).await)
    }

    async fn apply(
        &self,
        notification: &GatewayNotification,
    ) -> Result<ReconcileOutcome, sqlx::Error> {
        let Some(order) = self
            .orders
            .find_order_by_reference(&notification.order_id)
            .await?
        else {
            warn!(reference = %notification.order_id, "Notification for unknown order");
            return Ok(ReconcileOutcome::UnknownOrder);
        };

        let Some(target) = map_gateway_status(
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
        ) else {
            debug!(
                order_id = %order.id,
                transaction_status = %notification.transaction_status,
                fraud_status = ?notification.fraud_status,
                "Ignoring notification status"
            );
            return Ok(ReconcileOutcome::IgnoredStatus);
        };

        if target == PaymentStatus::Paid {
            let amount = Decimal::from_str(notification.gross_amount.trim()).ok();
            if amount != Some(order.total_amount) {
                warn!(
                    order_id = %order.id,
                    expected = %order.total_amount,
                    received = %notification.gross_amount,
                    "Paid notification amount does not match order total"
                );
                return Ok(ReconcileOutcome::AmountMismatch { order_id: order.id });
            }
        }

        if !order.payment_status.can_transition_to(target) {
            debug!(
                order_id = %order.id,
                current = ?order.payment_status,
                target = ?target,
                "Notification does not change order"
            );
            return Ok(ReconcileOutcome::Unchanged {
                order_id: order.id,
                status: order.payment_status,
            });
        }

        let applied = self
            .orders
            .transition_payment_status(order.id, target, target.legal_predecessors())
            .await?;
        if !applied {
            // Another notification moved the order since we read it.
            return Ok(ReconcileOutcome::Unchanged {
                order_id: order.id,
                status: order.payment_status,
            });
        }

        info!(
            order_id = %order.id,
            from = ?order.payment_status,
            to = ?target,
            "Payment status updated"
        );
        if target == PaymentStatus::Paid {
            if let Err(e) = self.order_paid_tx.send(OrderPaid { order_id: order.id }).await {
                error!(order_id = %order.id, error = %e, "Ticket issuer is gone, order paid event dropped");
            }
        }
        Ok(ReconcileOutcome::Transitioned {
            order_id: order.id,
            from: order.payment_status,
            to: target,
        })
    }
}

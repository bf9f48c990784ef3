//! TicketIssuer processor.
//!
//! The TicketIssuer is responsible for:
//! - Receiving `OrderPaid` events
//! - Loading the order's lines
//! - Generating one ticket per purchased unit through the `TicketGenerator`
//!
//! Generation is exactly-once per order regardless of how many events
//! arrive; a repeated event ends in `TicketsAlreadyGenerated`, which is the
//! expected result of a duplicate and logged at debug.

use crate::events::{OrderPaid, OrderPaidReceiver};
use crate::orders::OrderLedger;
use crate::ticket_generation::{GenerateTickets, GenerationError, TicketGenerator};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ticket generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("order line for category {category_id} has invalid quantity {quantity}")]
    InvalidLine { category_id: Uuid, quantity: i32 },
}

pub struct TicketIssuer {
    orders: Arc<dyn OrderLedger>,
    generator: TicketGenerator,
    order_paid_rx: OrderPaidReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl TicketIssuer {
    pub fn new(
        orders: Arc<dyn OrderLedger>,
        generator: TicketGenerator,
        order_paid_rx: OrderPaidReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            orders,
            generator,
            order_paid_rx,
            shutdown_rx,
        }
    }

    /// Run the TicketIssuer.
    ///
    /// Paid orders left without tickets by an earlier run are issued first,
    /// then events are handled until shutdown or until every sender is gone.
    pub async fn run(mut self) {
        info!("TicketIssuer started");

        self.issue_backlog().await;

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("TicketIssuer received shutdown signal");
                        break;
                    }
                }

                event = self.order_paid_rx.recv() => {
                    let Some(event) = event else {
                        info!("OrderPaid channel closed");
                        break;
                    };
                    debug!(order_id = %event.order_id, "Received OrderPaid");
                    self.handle(event).await;
                }
            }
        }

        info!("TicketIssuer shutdown complete");
    }

    /// Issue tickets for paid orders that never got them, e.g. because the
    /// process stopped between the payment update and generation.
    async fn issue_backlog(&self) {
        let order_ids = match self.orders.paid_orders_without_tickets().await {
            Ok(order_ids) => order_ids,
            Err(e) => {
                error!(error = %e, "Failed to load paid orders without tickets");
                return;
            }
        };
        if !order_ids.is_empty() {
            info!(count = order_ids.len(), "Issuing tickets for paid orders left without them");
        }
        for order_id in order_ids {
            self.handle(OrderPaid { order_id }).await;
        }
    }

    async fn handle(&self, event: OrderPaid) {
        match self.issue(event).await {
            Ok(0) => {}
            Ok(count) => info!(order_id = %event.order_id, count, "Issued tickets"),
            Err(IssueError::Generation(GenerationError::TicketsAlreadyGenerated(order_id))) => {
                debug!(order_id = %order_id, "Tickets already generated");
            }
            Err(e) => error!(order_id = %event.order_id, error = %e, "Failed to issue tickets"),
        }
    }

    /// Generate tickets for one paid order. Returns how many were created.
    ///
    /// A line with a non-positive quantity fails the whole order; nothing is
    /// generated, so a corrected order can still be issued later.
    pub async fn issue(&self, event: OrderPaid) -> Result<usize, IssueError> {
        let lines = self.orders.order_lines(event.order_id).await?;
        if lines.is_empty() {
            warn!(order_id = %event.order_id, "Paid order has no lines, nothing to issue");
            return Ok(0);
        }
        let mut category_ids = Vec::with_capacity(lines.len());
        let mut quantities = Vec::with_capacity(lines.len());
        for line in &lines {
            let quantity = u32::try_from(line.quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or(IssueError::InvalidLine {
                    category_id: line.category_id,
                    quantity: line.quantity,
                })?;
            category_ids.push(line.category_id);
            quantities.push(quantity);
        }
        let tickets = self
            .generator
            .generate(GenerateTickets {
                order_id: event.order_id,
                category_ids,
                quantities,
            })
            .await?;
        Ok(tickets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentStatus;
    use crate::events::order_paid_channel;
    use crate::payments::{ReconcileOutcome, WebhookReconciler};
    use crate::test_support::MemoryDatabase;
    use gatepass_sdk::objects::webhook::GatewayNotification;
    use gatepass_sdk::signature::sign_notification;
    use std::time::Duration;

    #[tokio::test]
    async fn test_issue_generates_lines_once() {
        let db = MemoryDatabase::new();
        let general = db.add_category("General", false);
        let vip = db.add_category("VIP", true);
        let order = db.add_order(PaymentStatus::Paid);
        db.add_order_line(order, general, 2);
        db.add_order_line(order, vip, 1);
        let (_tx, rx) = order_paid_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let issuer = TicketIssuer::new(
            Arc::new(db.clone()),
            TicketGenerator::new(Arc::new(db.clone())),
            rx,
            shutdown_rx,
        );

        assert_eq!(issuer.issue(OrderPaid { order_id: order }).await.unwrap(), 3);
        assert!(matches!(
            issuer.issue(OrderPaid { order_id: order }).await,
            Err(IssueError::Generation(GenerationError::TicketsAlreadyGenerated(_)))
        ));
        assert_eq!(db.ticket_count(order), 3);
    }

    #[tokio::test]
    async fn test_webhook_replays_generate_tickets_once() {
        let key = b"server-key";
        let db = MemoryDatabase::new();
        let general = db.add_category("General", false);
        let (order, reference) = db.add_order_with_reference(PaymentStatus::Unpaid, 200);
        db.add_order_line(order, general, 2);

        let (tx, rx) = order_paid_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = WebhookReconciler::new(Arc::new(db.clone()), tx);
        let issuer = TicketIssuer::new(
            Arc::new(db.clone()),
            TicketGenerator::new(Arc::new(db.clone())),
            rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(issuer.run());

        let paid = GatewayNotification {
            order_id: reference.clone(),
            status_code: "200".to_string(),
            gross_amount: "200.00".to_string(),
            signature_key: sign_notification(&reference, "200", "200.00", key),
            transaction_status: "settlement".to_string(),
            fraud_status: None,
            transaction_id: Some("txn-1".to_string()),
            payment_type: Some("bank_transfer".to_string()),
        };
        let mut transitions = 0;
        for _ in 0..5 {
            if matches!(
                reconciler.handle(&paid, key).await,
                ReconcileOutcome::Transitioned { .. }
            ) {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);

        for _ in 0..50 {
            if db.ticket_count(order) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(db.ticket_count(order), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let db = MemoryDatabase::new();
        let (tx, rx) = order_paid_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let issuer = TicketIssuer::new(
            Arc::new(db.clone()),
            TicketGenerator::new(Arc::new(db)),
            rx,
            shutdown_rx,
        );
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), issuer.run())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_sender_is_dropped() {
        let db = MemoryDatabase::new();
        let (_tx, rx) = order_paid_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let issuer = TicketIssuer::new(
            Arc::new(db.clone()),
            TicketGenerator::new(Arc::new(db)),
            rx,
            shutdown_rx,
        );
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(5), issuer.run())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_issues_paid_orders_left_without_tickets() {
        let db = MemoryDatabase::new();
        let general = db.add_category("General", false);
        let paid = db.add_order(PaymentStatus::Paid);
        db.add_order_line(paid, general, 3);
        let unpaid = db.add_order(PaymentStatus::Unpaid);
        db.add_order_line(unpaid, general, 1);

        // No event is ever sent for `paid`; the sender closes right away.
        let (tx, rx) = order_paid_channel();
        drop(tx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let issuer = TicketIssuer::new(
            Arc::new(db.clone()),
            TicketGenerator::new(Arc::new(db.clone())),
            rx,
            shutdown_rx,
        );
        tokio::time::timeout(Duration::from_secs(5), issuer.run())
            .await
            .unwrap();

        assert_eq!(db.ticket_count(paid), 3);
        assert_eq!(db.ticket_count(unpaid), 0);
    }

    #[tokio::test]
    async fn test_invalid_line_fails_whole_order() {
        let db = MemoryDatabase::new();
        let general = db.add_category("General", false);
        let vip = db.add_category("VIP", true);
        let order = db.add_order(PaymentStatus::Paid);
        db.add_order_line(order, general, 2);
        db.add_order_line(order, vip, -1);
        let (_tx, rx) = order_paid_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let issuer = TicketIssuer::new(
            Arc::new(db.clone()),
            TicketGenerator::new(Arc::new(db.clone())),
            rx,
            shutdown_rx,
        );

        assert!(matches!(
            issuer.issue(OrderPaid { order_id: order }).await,
            Err(IssueError::InvalidLine { quantity: -1, .. })
        ));
        assert_eq!(db.ticket_count(order), 0);
    }
}

//! Turning a paid order into tickets, exactly once.
//!
//! The whole operation runs in one transaction holding the order row lock,
//! so concurrent generation requests for one order are serialized and all
//! but the first observe the tickets it created.

use crate::entities::orders::{self, OrderRecord};
use crate::entities::tickets::{self, NewTicket, Ticket};
use crate::entities::{categories, PaymentStatus};
use crate::framework::{DatabaseProcessor, TransactionProcessor};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Most tickets a single order may produce.
pub const MAX_TICKETS_PER_ORDER: u64 = 1_000;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
    #[error("order {order_id} is {status:?}, not paid")]
    OrderNotPaid {
        order_id: Uuid,
        status: PaymentStatus,
    },
    #[error("tickets for order {0} were already generated")]
    TicketsAlreadyGenerated(Uuid),
    #[error("one or more categories do not exist")]
    CategoryNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Source of generation transactions.
#[async_trait]
pub trait TicketLedger: Send + Sync {
    async fn begin_generation(&self) -> Result<Box<dyn LedgerTransaction>, sqlx::Error>;
}

/// One generation transaction. Dropping it without `commit` rolls back and
/// releases the order lock.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Lock the order row until the transaction ends.
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error>;

    async fn count_tickets(&mut self, order_id: Uuid) -> Result<i64, sqlx::Error>;

    async fn count_categories(&mut self, category_ids: &[Uuid]) -> Result<i64, sqlx::Error>;

    async fn insert_tickets(&mut self, tickets: Vec<NewTicket>) -> Result<Vec<Ticket>, sqlx::Error>;

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl TicketLedger for DatabaseProcessor {
    async fn begin_generation(&self) -> Result<Box<dyn LedgerTransaction>, sqlx::Error> {
        Ok(Box::new(self.begin().await?))
    }
}

#[async_trait]
impl LedgerTransaction for TransactionProcessor<'static> {
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        orders::lock_for_update(&mut *self.tx, order_id).await
    }

    async fn count_tickets(&mut self, order_id: Uuid) -> Result<i64, sqlx::Error> {
        tickets::count_for_order(&mut *self.tx, order_id).await
    }

    async fn count_categories(&mut self, category_ids: &[Uuid]) -> Result<i64, sqlx::Error> {
        categories::count_existing(&mut *self.tx, category_ids).await
    }

    async fn insert_tickets(&mut self, tickets: Vec<NewTicket>) -> Result<Vec<Ticket>, sqlx::Error> {
        tickets::insert_many(&mut *self.tx, &tickets).await
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        TransactionProcessor::commit(*self).await
    }
}

/// `category_ids[i]` is issued `quantities[i]` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateTickets {
    pub order_id: Uuid,
    pub category_ids: Vec<Uuid>,
    pub quantities: Vec<u32>,
}

impl GenerateTickets {
    fn validate(&self) -> Result<u64, GenerationError> {
        if self.category_ids.len() != self.quantities.len() {
            return Err(GenerationError::InvalidRequest(format!(
                "{} categories but {} quantities",
                self.category_ids.len(),
                self.quantities.len()
            )));
        }
        if self.category_ids.is_empty() {
            return Err(GenerationError::InvalidRequest("no categories given".to_string()));
        }
        if self.quantities.contains(&0) {
            return Err(GenerationError::InvalidRequest(
                "quantities must be positive".to_string(),
            ));
        }
        let total: u64 = self.quantities.iter().map(|q| u64::from(*q)).sum();
        if total > MAX_TICKETS_PER_ORDER {
            return Err(GenerationError::InvalidRequest(format!(
                "at most {MAX_TICKETS_PER_ORDER} tickets per order"
            )));
        }
        Ok(total)
    }
}

pub fn new_qr_code() -> String {
    format!("QR-{}", Uuid::new_v4().simple())
}

#[derive(Clone)]
pub struct TicketGenerator {
    ledger: Arc<dyn TicketLedger>,
}

impl TicketGenerator {
    pub fn new(ledger: Arc<dyn TicketLedger>) -> Self {
        Self { ledger }
    }

    pub async fn generate(&self, request: GenerateTickets) -> Result<Vec<Ticket>, GenerationError> {
        let total = request.validate()?;
        let order_id = request.order_id;

        let mut tx = self.ledger.begin_generation().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(GenerationError::OrderNotFound(order_id))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(GenerationError::OrderNotPaid {
                order_id,
                status: order.payment_status,
            });
        }
        if tx.count_tickets(order_id).await? > 0 {
            return Err(GenerationError::TicketsAlreadyGenerated(order_id));
        }

        let distinct: Vec<Uuid> = request
            .category_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let found = tx.count_categories(&distinct).await?;
        if usize::try_from(found).ok() != Some(distinct.len()) {
            return Err(GenerationError::CategoryNotFound);
        }

        let new_tickets: Vec<NewTicket> = request
            .category_ids
            .iter()
            .zip(&request.quantities)
            .flat_map(|(category_id, quantity)| {
                (0..*quantity).map(move |_| NewTicket {
                    order_id,
                    category_id: *category_id,
                    qr_code: new_qr_code(),
                })
            })
            .collect();
        let tickets = tx.insert_tickets(new_tickets).await?;
        tx.commit().await?;

        info!(order_id = %order_id, count = total, "Generated tickets");
        Ok(tickets)
    }
}

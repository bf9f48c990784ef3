//! Guest order placement and the order ledger used by payment handling.

use crate::entities::categories::{Category, GetCategoriesByIds};
use crate::entities::order_lines::{self, GetOrderLines, OrderLine};
use crate::entities::orders::{
    self, GetOrderByGatewayReference, GetOrderById, GetPaidOrdersWithoutTickets, NewOrder,
    OrderRecord, TransitionPaymentStatus,
};
use crate::entities::PaymentStatus;
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Most units of one category a single order line may request.
pub const MAX_QUANTITY_PER_LINE: u32 = 100;

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error>;

    async fn find_order_by_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<OrderRecord>, sqlx::Error>;

    /// Apply `to` only while the order is in one of `from`. Returns whether
    /// a row changed.
    async fn transition_payment_status(
        &self,
        order_id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> Result<bool, sqlx::Error>;

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, sqlx::Error>;

    /// Paid orders whose tickets were never generated.
    async fn paid_orders_without_tickets(&self) -> Result<Vec<Uuid>, sqlx::Error>;

    async fn categories(&self, category_ids: &[Uuid]) -> Result<Vec<Category>, sqlx::Error>;

    /// Insert the order and its lines in one transaction.
    async fn insert_order(
        &self,
        order: NewOrder,
        lines: Vec<OrderLine>,
    ) -> Result<OrderRecord, sqlx::Error>;
}

#[async_trait]
impl OrderLedger for DatabaseProcessor {
    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        self.process(GetOrderById { order_id }).await
    }

    async fn find_order_by_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        self.process(GetOrderByGatewayReference {
            gateway_reference: gateway_reference.to_string(),
        })
        .await
    }

    async fn transition_payment_status(
        &self,
        order_id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> Result<bool, sqlx::Error> {
        self.process(TransitionPaymentStatus {
            order_id,
            to,
            from: from.to_vec(),
        })
        .await
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, sqlx::Error> {
        self.process(GetOrderLines { order_id }).await
    }

    async fn paid_orders_without_tickets(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        self.process(GetPaidOrdersWithoutTickets).await
    }

    async fn categories(&self, category_ids: &[Uuid]) -> Result<Vec<Category>, sqlx::Error> {
        self.process(GetCategoriesByIds {
            ids: category_ids.to_vec(),
        })
        .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertOrder")]
    async fn insert_order(
        &self,
        order: NewOrder,
        lines: Vec<OrderLine>,
    ) -> Result<OrderRecord, sqlx::Error> {
        let mut tx = self.begin().await?;
        let record = orders::insert(&mut *tx.tx, &order).await?;
        order_lines::insert_many(&mut *tx.tx, &lines).await?;
        tx.commit().await?;
        Ok(record)
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("one or more categories do not exist")]
    CategoryNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedLine {
    pub category_id: Uuid,
    pub quantity: u32,
}

pub fn new_gateway_reference() -> String {
    format!("GP-{}", Uuid::new_v4().simple())
}

/// Price each requested line. Repeated categories are merged.
pub fn price_lines(
    order_id: Uuid,
    requested: &[RequestedLine],
    categories: &[Category],
) -> Result<(Vec<OrderLine>, Decimal), OrderError> {
    if requested.is_empty() {
        return Err(OrderError::InvalidRequest("an order needs at least one line".to_string()));
    }
    let mut quantities: HashMap<Uuid, u32> = HashMap::new();
    for line in requested {
        if line.quantity == 0 || line.quantity > MAX_QUANTITY_PER_LINE {
            return Err(OrderError::InvalidRequest(format!(
                "quantity must be between 1 and {MAX_QUANTITY_PER_LINE}"
            )));
        }
        let merged = quantities.entry(line.category_id).or_default();
        *merged = merged.saturating_add(line.quantity);
        if *merged > MAX_QUANTITY_PER_LINE {
            return Err(OrderError::InvalidRequest(format!(
                "quantity must be between 1 and {MAX_QUANTITY_PER_LINE}"
            )));
        }
    }

    let prices: HashMap<Uuid, Decimal> = categories.iter().map(|c| (c.id, c.price)).collect();
    let mut lines = Vec::with_capacity(quantities.len());
    let mut total = Decimal::ZERO;
    for (category_id, quantity) in quantities {
        let unit_price = *prices.get(&category_id).ok_or(OrderError::CategoryNotFound)?;
        total += unit_price * Decimal::from(quantity);
        lines.push(OrderLine {
            order_id,
            category_id,
            quantity: i32::try_from(quantity)
                .map_err(|_| OrderError::InvalidRequest("quantity too large".to_string()))?,
            unit_price,
        });
    }
    lines.sort_by_key(|l| l.category_id);
    Ok((lines, total))
}

#[derive(Clone)]
pub struct OrderService {
    ledger: Arc<dyn OrderLedger>,
}

impl OrderService {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self { ledger }
    }

    pub async fn place_order(
        &self,
        user_id: Uuid,
        requested: &[RequestedLine],
    ) -> Result<OrderRecord, OrderError> {
        let order_id = Uuid::now_v7();
        let category_ids: Vec<Uuid> = requested.iter().map(|l| l.category_id).collect();
        let categories = self.ledger.categories(&category_ids).await?;
        let (lines, total_amount) = price_lines(order_id, requested, &categories)?;

        let order = self
            .ledger
            .insert_order(
                NewOrder {
                    id: order_id,
                    user_id,
                    gateway_reference: new_gateway_reference(),
                    total_amount,
                },
                lines,
            )
            .await?;
        info!(
            order_id = %order.id,
            user_id = %user_id,
            total = %order.total_amount,
            "Order placed"
        );
        Ok(order)
    }

    pub async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        self.ledger.find_order(order_id).await
    }
}

use super::PaymentStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_reference: String,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

const ORDER_COLUMNS: &str =
    "id, user_id, gateway_reference, total_amount, payment_status, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct GetOrderById {
    pub order_id: Uuid,
}

impl Processor<GetOrderById> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderById")]
    async fn process(&self, query: GetOrderById) -> Result<Option<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(query.order_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOrderByGatewayReference {
    pub gateway_reference: String,
}

impl Processor<GetOrderByGatewayReference> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderByGatewayReference")]
    async fn process(
        &self,
        query: GetOrderByGatewayReference,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE gateway_reference = $1"
        ))
        .bind(&query.gateway_reference)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Move an order to `to`, but only while it is still in one of `from`.
///
/// Returns whether a row changed. Concurrent callers racing the same
/// transition see exactly one `true`.
#[derive(Debug, Clone)]
pub struct TransitionPaymentStatus {
    pub order_id: Uuid,
    pub to: PaymentStatus,
    pub from: Vec<PaymentStatus>,
}

impl Processor<TransitionPaymentStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TransitionPaymentStatus")]
    async fn process(&self, update: TransitionPaymentStatus) -> Result<bool, sqlx::Error> {
        if update.from.is_empty() {
            return Ok(false);
        }
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "UPDATE orders SET updated_at = (NOW() AT TIME ZONE 'utc'), payment_status = ",
        );
        builder.push_bind(update.to);
        builder.push(" WHERE id = ");
        builder.push_bind(update.order_id);
        builder.push(" AND payment_status IN (");
        let mut separated = builder.separated(", ");
        for status in &update.from {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Paid orders that have no tickets yet, oldest first.
#[derive(Debug, Clone)]
pub struct GetPaidOrdersWithoutTickets;

impl Processor<GetPaidOrdersWithoutTickets> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaidOrdersWithoutTickets")]
    async fn process(&self, _query: GetPaidOrdersWithoutTickets) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT o.id FROM orders o
            WHERE o.payment_status = 'paid'
              AND NOT EXISTS (SELECT 1 FROM order_items t WHERE t.order_id = o.id)
            ORDER BY o.updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// Select the order row `FOR UPDATE`. Holds the row lock until the
/// surrounding transaction ends.
pub async fn lock_for_update<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    sqlx::query_as::<_, OrderRecord>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(executor)
    .await
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_reference: String,
    pub total_amount: Decimal,
}

pub async fn insert<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    order: &NewOrder,
) -> Result<OrderRecord, sqlx::Error> {
    sqlx::query_as::<_, OrderRecord>(&format!(
        r#"
        INSERT INTO orders (id, user_id, gateway_reference, total_amount, payment_status)
        VALUES ($1, $2, $3, $4, 'unpaid')
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(order.id)
    .bind(order.user_id)
    .bind(&order.gateway_reference)
    .bind(order.total_amount)
    .fetch_one(executor)
    .await
}

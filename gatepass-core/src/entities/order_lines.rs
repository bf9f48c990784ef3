use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderLine {
    pub order_id: Uuid,
    pub category_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct GetOrderLines {
    pub order_id: Uuid,
}

impl Processor<GetOrderLines> for DatabaseProcessor {
    type Output = Vec<OrderLine>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderLines")]
    async fn process(&self, query: GetOrderLines) -> Result<Vec<OrderLine>, sqlx::Error> {
        sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT order_id, category_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = $1
            ORDER BY category_id
            "#,
        )
        .bind(query.order_id)
        .fetch_all(&self.pool)
        .await
    }
}

pub async fn insert_many<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    lines: &[OrderLine],
) -> Result<(), sqlx::Error> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "INSERT INTO order_lines (order_id, category_id, quantity, unit_price) ",
    );
    builder.push_values(lines, |mut row, line| {
        row.push_bind(line.order_id)
            .push_bind(line.category_id)
            .push_bind(line.quantity)
            .push_bind(line.unit_price);
    });
    builder.build().execute(executor).await?;
    Ok(())
}

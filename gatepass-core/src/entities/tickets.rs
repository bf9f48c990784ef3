use super::TicketStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// A single admission ticket (an order item carrying a QR code).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    pub category_id: Uuid,
    pub qr_code: String,
    pub status: TicketStatus,
    pub checked_in_at: Option<time::PrimitiveDateTime>,
    pub created_at: time::PrimitiveDateTime,
}

/// A ticket joined with the category facts the gate needs.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TicketDetail {
    pub id: Uuid,
    pub order_id: Uuid,
    pub category_id: Uuid,
    pub qr_code: String,
    pub status: TicketStatus,
    pub checked_in_at: Option<time::PrimitiveDateTime>,
    pub category_name: String,
    pub category_is_vip: bool,
}

const DETAIL_SELECT: &str = r#"
    SELECT t.id, t.order_id, t.category_id, t.qr_code, t.status, t.checked_in_at,
           c.name AS category_name, c.is_vip AS category_is_vip
    FROM order_items t
    JOIN categories c ON c.id = t.category_id
"#;

#[derive(Debug, Clone)]
pub struct GetTicketByQrCode {
    pub qr_code: String,
}

impl Processor<GetTicketByQrCode> for DatabaseProcessor {
    type Output = Option<TicketDetail>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetTicketByQrCode")]
    async fn process(&self, query: GetTicketByQrCode) -> Result<Option<TicketDetail>, sqlx::Error> {
        sqlx::query_as::<_, TicketDetail>(&format!("{DETAIL_SELECT} WHERE t.qr_code = $1"))
            .bind(&query.qr_code)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetTicketById {
    pub ticket_id: Uuid,
}

impl Processor<GetTicketById> for DatabaseProcessor {
    type Output = Option<TicketDetail>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetTicketById")]
    async fn process(&self, query: GetTicketById) -> Result<Option<TicketDetail>, sqlx::Error> {
        sqlx::query_as::<_, TicketDetail>(&format!("{DETAIL_SELECT} WHERE t.id = $1"))
            .bind(query.ticket_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub order_id: Uuid,
    pub category_id: Uuid,
    pub qr_code: String,
}

pub async fn count_for_order<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    order_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(executor)
        .await
}

/// Insert all tickets in one statement. New tickets start out `paid`.
pub async fn insert_many<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    tickets: &[NewTicket],
) -> Result<Vec<Ticket>, sqlx::Error> {
    if tickets.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "INSERT INTO order_items (id, order_id, category_id, qr_code, status) ",
    );
    builder.push_values(tickets, |mut row, ticket| {
        row.push_bind(Uuid::now_v7())
            .push_bind(ticket.order_id)
            .push_bind(ticket.category_id)
            .push_bind(&ticket.qr_code)
            .push_bind(TicketStatus::Paid);
    });
    builder.push(
        " RETURNING id, order_id, category_id, qr_code, status, checked_in_at, created_at",
    );
    builder.build_query_as::<Ticket>().fetch_all(executor).await
}

/// Flip a `paid` ticket to `checked_in`. Returns whether a row changed.
pub async fn mark_checked_in<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    ticket_id: Uuid,
    at: time::PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE order_items
        SET status = 'checked_in', checked_in_at = $2
        WHERE id = $1 AND status = 'paid'
        "#,
    )
    .bind(ticket_id)
    .bind(at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

use super::CheckInStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CheckInRecord {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub gate_id: Option<Uuid>,
    pub staff_id: Uuid,
    pub status: CheckInStatus,
    pub location: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub checked_in_at: time::PrimitiveDateTime,
}

const CHECK_IN_COLUMNS: &str =
    "id, order_item_id, gate_id, staff_id, status, location, client_ip, user_agent, checked_in_at";

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub order_item_id: Uuid,
    pub gate_id: Option<Uuid>,
    pub staff_id: Uuid,
    pub location: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub checked_in_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub struct GetCheckInForTicket {
    pub ticket_id: Uuid,
}

impl Processor<GetCheckInForTicket> for DatabaseProcessor {
    type Output = Option<CheckInRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCheckInForTicket")]
    async fn process(&self, query: GetCheckInForTicket) -> Result<Option<CheckInRecord>, sqlx::Error> {
        sqlx::query_as::<_, CheckInRecord>(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM check_ins WHERE order_item_id = $1 AND status = 'success'"
        ))
        .bind(query.ticket_id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Successful check-ins recorded at a gate since `since` (UTC).
#[derive(Debug, Clone)]
pub struct CountGateCheckInsSince {
    pub gate_id: Uuid,
    pub since: time::PrimitiveDateTime,
}

impl Processor<CountGateCheckInsSince> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CountGateCheckInsSince")]
    async fn process(&self, query: CountGateCheckInsSince) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM check_ins
            WHERE gate_id = $1 AND status = 'success' AND checked_in_at >= $2
            "#,
        )
        .bind(query.gate_id)
        .bind(query.since)
        .fetch_one(&self.pool)
        .await
    }
}

/// Insert a successful check-in unless one already exists for the ticket.
///
/// `None` means the uniqueness constraint on `order_item_id` rejected the
/// row: another check-in won.
pub async fn insert_if_absent<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    check_in: &NewCheckIn,
) -> Result<Option<CheckInRecord>, sqlx::Error> {
    sqlx::query_as::<_, CheckInRecord>(&format!(
        r#"
        INSERT INTO check_ins
            (id, order_item_id, gate_id, staff_id, status, location, client_ip, user_agent, checked_in_at)
        VALUES ($1, $2, $3, $4, 'success', $5, $6, $7, $8)
        ON CONFLICT (order_item_id) DO NOTHING
        RETURNING {CHECK_IN_COLUMNS}
        "#
    ))
    .bind(Uuid::now_v7())
    .bind(check_in.order_item_id)
    .bind(check_in.gate_id)
    .bind(check_in.staff_id)
    .bind(&check_in.location)
    .bind(&check_in.client_ip)
    .bind(&check_in.user_agent)
    .bind(check_in.checked_in_at)
    .fetch_optional(executor)
    .await
}

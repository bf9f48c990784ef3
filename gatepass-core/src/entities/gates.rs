use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Gate {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub is_vip: bool,
    pub is_active: bool,
    /// Successful check-ins allowed per venue day. `None` or zero means unlimited.
    pub capacity: Option<i32>,
}

impl Gate {
    pub fn capacity_limit(&self) -> Option<i64> {
        self.capacity.filter(|c| *c > 0).map(i64::from)
    }
}

#[derive(Debug, Clone)]
pub struct GetGateById {
    pub gate_id: Uuid,
}

impl Processor<GetGateById> for DatabaseProcessor {
    type Output = Option<Gate>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetGateById")]
    async fn process(&self, query: GetGateById) -> Result<Option<Gate>, sqlx::Error> {
        sqlx::query_as::<_, Gate>(
            "SELECT id, code, name, is_vip, is_active, capacity FROM gates WHERE id = $1",
        )
        .bind(query.gate_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct IsStaffAssigned {
    pub gate_id: Uuid,
    pub staff_id: Uuid,
}

impl Processor<IsStaffAssigned> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:IsStaffAssigned")]
    async fn process(&self, query: IsStaffAssigned) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM gate_staff WHERE gate_id = $1 AND staff_id = $2)",
        )
        .bind(query.gate_id)
        .bind(query.staff_id)
        .fetch_one(&self.pool)
        .await
    }
}

/// Idempotent: assigning an already assigned staff member is not an error.
#[derive(Debug, Clone)]
pub struct AssignGateStaff {
    pub gate_id: Uuid,
    pub staff_id: Uuid,
}

impl Processor<AssignGateStaff> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AssignGateStaff")]
    async fn process(&self, cmd: AssignGateStaff) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO gate_staff (gate_id, staff_id)
            VALUES ($1, $2)
            ON CONFLICT (gate_id, staff_id) DO NOTHING
            "#,
        )
        .bind(cmd.gate_id)
        .bind(cmd.staff_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Returns whether an assignment existed.
#[derive(Debug, Clone)]
pub struct UnassignGateStaff {
    pub gate_id: Uuid,
    pub staff_id: Uuid,
}

impl Processor<UnassignGateStaff> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UnassignGateStaff")]
    async fn process(&self, cmd: UnassignGateStaff) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM gate_staff WHERE gate_id = $1 AND staff_id = $2")
            .bind(cmd.gate_id)
            .bind(cmd.staff_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

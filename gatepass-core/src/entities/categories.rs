use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_vip: bool,
}

/// Fetch every category whose id is in `ids`. Missing ids are simply absent.
#[derive(Debug, Clone)]
pub struct GetCategoriesByIds {
    pub ids: Vec<Uuid>,
}

impl Processor<GetCategoriesByIds> for DatabaseProcessor {
    type Output = Vec<Category>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCategoriesByIds")]
    async fn process(&self, query: GetCategoriesByIds) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, price, is_vip
            FROM categories
            WHERE id = ANY($1)
            "#,
        )
        .bind(&query.ids)
        .fetch_all(&self.pool)
        .await
    }
}

/// Count how many of the given (distinct) ids exist.
pub async fn count_existing<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    ids: &[Uuid],
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE id = ANY($1)")
        .bind(ids)
        .fetch_one(executor)
        .await
}

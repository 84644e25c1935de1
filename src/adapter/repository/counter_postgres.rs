use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entity::counter::CounterRow;
use crate::domain::period::PeriodType;
use crate::domain::repository::CounterRepository;

/// CounterPostgresRepository は PostgreSQL ベースのカウンターストア。
///
/// increment_or_insert は単一の upsert 文で行うため、同一キーへの同時実行は
/// 一意インデックス上で直列化され、加算が失われることはない。
pub struct CounterPostgresRepository {
    pool: PgPool,
}

impl CounterPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterRepository for CounterPostgresRepository {
    async fn get_count(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT request_count
            FROM rate_limit_counters
            WHERE user_id = $1 AND period_type = $2 AND period_start = $3
            "#,
        )
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0).unwrap_or(0))
    }

    async fn increment_or_insert(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO rate_limit_counters (user_id, period_type, period_start, request_count, created_at, updated_at)
            VALUES ($1, $2, $3, 1, $4, $4)
            ON CONFLICT (user_id, period_type, period_start)
            DO UPDATE SET request_count = rate_limit_counters.request_count + 1,
                          updated_at = $4
            RETURNING request_count
            "#,
        )
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(period_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        limit: i64,
    ) -> anyhow::Result<Vec<CounterRow>> {
        let rows = sqlx::query_as::<_, CounterRowRecord>(
            r#"
            SELECT id, user_id, period_type, period_start, request_count, created_at, updated_at
            FROM rate_limit_counters
            WHERE user_id = $1 AND period_type = $2
            ORDER BY period_start DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_row()).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CounterRowRecord {
    id: i64,
    user_id: String,
    period_type: String,
    period_start: DateTime<Utc>,
    request_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CounterRowRecord {
    fn into_row(self) -> anyhow::Result<CounterRow> {
        let period_type = PeriodType::from_str(&self.period_type)
            .ok_or_else(|| anyhow::anyhow!("invalid period_type in DB: {}", self.period_type))?;

        Ok(CounterRow {
            id: self.id,
            user_id: self.user_id,
            period_type,
            period_start: self.period_start,
            request_count: self.request_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entity::counter::UsageWindow;
use crate::domain::period::{self, PeriodType};
use crate::domain::repository::{CounterRepository, DEFAULT_HISTORY_LIMIT};

#[derive(Debug, thiserror::Error)]
pub enum GetUsageHistoryError {
    #[error("counter store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone)]
pub struct GetUsageHistoryInput {
    pub user_id: String,
    pub period_type: PeriodType,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// GetUsageHistoryUseCase は過去ピリオドの利用履歴を返す。
///
/// 各行の period_end は Period Calculator の next_* で導出した排他的終端。
/// 行は period_start 降順（新しい順）で返る。
pub struct GetUsageHistoryUseCase {
    counter_repo: Arc<dyn CounterRepository>,
}

impl GetUsageHistoryUseCase {
    pub fn new(counter_repo: Arc<dyn CounterRepository>) -> Self {
        Self { counter_repo }
    }

    pub async fn execute(
        &self,
        input: &GetUsageHistoryInput,
    ) -> Result<Vec<UsageWindow>, GetUsageHistoryError> {
        let limit = input.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let rows = self
            .counter_repo
            .history(&input.user_id, input.period_type, limit)
            .await
            .map_err(|e| GetUsageHistoryError::Store(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| UsageWindow {
                period_start: row.period_start,
                period_end: period::period_end(
                    input.period_type,
                    input.subscription_started_at,
                    row.period_start,
                ),
                request_count: row.request_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::entity::counter::CounterRow;
    use crate::domain::repository::counter_repository::MockCounterRepository;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn row(id: i64, period_type: PeriodType, start: DateTime<Utc>, count: i64) -> CounterRow {
        CounterRow {
            id,
            user_id: "user-123".to_string(),
            period_type,
            period_start: start,
            request_count: count,
            created_at: start,
            updated_at: start,
        }
    }

    #[tokio::test]
    async fn test_history_maps_rows_to_windows() {
        let mut repo = MockCounterRepository::new();
        repo.expect_history()
            .withf(|user_id, period_type, limit| {
                user_id == "user-123" && *period_type == PeriodType::Hourly && *limit == 100
            })
            .returning(|_, _, _| {
                Ok(vec![
                    row(2, PeriodType::Hourly, utc(2025, 6, 15, 14), 7),
                    row(1, PeriodType::Hourly, utc(2025, 6, 15, 13), 3),
                ])
            });

        let uc = GetUsageHistoryUseCase::new(Arc::new(repo));
        let input = GetUsageHistoryInput {
            user_id: "user-123".to_string(),
            period_type: PeriodType::Hourly,
            subscription_started_at: None,
            limit: None,
        };
        let windows = uc.execute(&input).await.unwrap();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].period_start, utc(2025, 6, 15, 14));
        assert_eq!(windows[0].period_end, utc(2025, 6, 15, 15));
        assert_eq!(windows[0].request_count, 7);
        assert_eq!(windows[1].period_end, utc(2025, 6, 15, 14));
        // Most recent first.
        assert!(windows[0].period_start > windows[1].period_start);
    }

    #[tokio::test]
    async fn test_monthly_history_ends_at_anchored_next_month() {
        let anchor = Some(utc(2025, 1, 31, 0));
        let mut repo = MockCounterRepository::new();
        repo.expect_history().returning(|_, _, _| {
            Ok(vec![
                row(2, PeriodType::Monthly, utc(2025, 2, 28, 0), 12),
                row(1, PeriodType::Monthly, utc(2025, 1, 31, 0), 20),
            ])
        });

        let uc = GetUsageHistoryUseCase::new(Arc::new(repo));
        let input = GetUsageHistoryInput {
            user_id: "user-123".to_string(),
            period_type: PeriodType::Monthly,
            subscription_started_at: anchor,
            limit: Some(10),
        };
        let windows = uc.execute(&input).await.unwrap();

        // Feb 28 window runs to March 31; the clamped January window ends Feb 28.
        assert_eq!(windows[0].period_end, utc(2025, 3, 31, 0));
        assert_eq!(windows[1].period_end, utc(2025, 2, 28, 0));
    }

    #[tokio::test]
    async fn test_explicit_limit_is_passed_through() {
        let mut repo = MockCounterRepository::new();
        repo.expect_history()
            .withf(|_, _, limit| *limit == 5)
            .returning(|_, _, _| Ok(vec![]));

        let uc = GetUsageHistoryUseCase::new(Arc::new(repo));
        let input = GetUsageHistoryInput {
            user_id: "user-123".to_string(),
            period_type: PeriodType::Daily,
            subscription_started_at: None,
            limit: Some(5),
        };
        let windows = uc.execute(&input).await.unwrap();
        assert!(windows.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_surfaces() {
        let mut repo = MockCounterRepository::new();
        repo.expect_history()
            .returning(|_, _, _| Err(anyhow::anyhow!("db error")));

        let uc = GetUsageHistoryUseCase::new(Arc::new(repo));
        let input = GetUsageHistoryInput {
            user_id: "user-123".to_string(),
            period_type: PeriodType::Daily,
            subscription_started_at: None,
            limit: None,
        };
        let result = uc.execute(&input).await;
        assert!(result.is_err());
        match result.unwrap_err() {
            GetUsageHistoryError::Store(msg) => assert!(msg.contains("db error")),
        }
    }
}

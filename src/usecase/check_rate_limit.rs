use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entity::decision::{AdmissionDecision, RemainingQuota};
use crate::domain::entity::limits::{Limit, RateLimits};
use crate::domain::period::{self, PeriodType};
use crate::domain::repository::CounterRepository;

/// CheckRateLimitError はレートリミット判定に関するエラー。
/// 上限超過はエラーではなく AdmissionDecision::denied として返る。
#[derive(Debug, thiserror::Error)]
pub enum CheckRateLimitError {
    #[error("counter store error: {0}")]
    Store(String),
}

/// 判定対象のリクエスト。
#[derive(Debug, Clone)]
pub struct CheckRateLimitInput {
    pub user_id: String,
    pub limits: RateLimits,
    pub subscription_started_at: Option<DateTime<Utc>>,
}

/// CheckRateLimitUseCase は許可判定エンジン。
///
/// 3 ピリオドのカウンターを並行に読み、hourly → daily → monthly の優先順位で
/// 上限を照合する。許可時のみ、上限が有限のピリオドのカウンターを並行に進める。
pub struct CheckRateLimitUseCase {
    counter_repo: Arc<dyn CounterRepository>,
}

impl CheckRateLimitUseCase {
    pub fn new(counter_repo: Arc<dyn CounterRepository>) -> Self {
        Self { counter_repo }
    }

    /// チェックしてカウンターを進める。now が None の場合は現在時刻を使う。
    pub async fn check_and_increment(
        &self,
        input: &CheckRateLimitInput,
        now: Option<DateTime<Utc>>,
    ) -> Result<AdmissionDecision, CheckRateLimitError> {
        self.run(input, now.unwrap_or_else(Utc::now), true).await
    }

    /// カウンターを進めない読み取り専用の判定。
    pub async fn check_only(
        &self,
        input: &CheckRateLimitInput,
        now: Option<DateTime<Utc>>,
    ) -> Result<AdmissionDecision, CheckRateLimitError> {
        self.run(input, now.unwrap_or_else(Utc::now), false).await
    }

    async fn run(
        &self,
        input: &CheckRateLimitInput,
        now: DateTime<Utc>,
        increment: bool,
    ) -> Result<AdmissionDecision, CheckRateLimitError> {
        let hour_start = period::current_hour_start(now);
        let day_start = period::current_day_start(now);
        let month_start = period::subscription_month_start(input.subscription_started_at, now);

        let user_id = input.user_id.as_str();
        let repo = &self.counter_repo;

        let (hourly_count, daily_count, monthly_count) = tokio::try_join!(
            repo.get_count(user_id, PeriodType::Hourly, hour_start),
            repo.get_count(user_id, PeriodType::Daily, day_start),
            repo.get_count(user_id, PeriodType::Monthly, month_start),
        )
        .map_err(|e| CheckRateLimitError::Store(e.to_string()))?;

        // 優先順位 hourly → daily → monthly。最初に超過したピリオドで拒否する。
        let checks = [
            (PeriodType::Hourly, input.limits.hourly, hourly_count),
            (PeriodType::Daily, input.limits.daily, daily_count),
            (PeriodType::Monthly, input.limits.monthly, monthly_count),
        ];
        for (period_type, limit, count) in checks {
            if let Limit::Bounded(bound) = limit {
                if count as u64 >= bound {
                    let remaining =
                        remaining_quota(&input.limits, hourly_count, daily_count, monthly_count, 0);
                    return Ok(AdmissionDecision::denied(remaining, period_type, input.limits));
                }
            }
        }

        let consumed = if increment {
            // Unlimited のピリオドにはカウンター行を作らない
            let bump = |period_type: PeriodType, limit: Limit, start: DateTime<Utc>| async move {
                match limit {
                    Limit::Bounded(_) => repo
                        .increment_or_insert(user_id, period_type, start, now)
                        .await
                        .map(|_| ()),
                    Limit::Unlimited => Ok(()),
                }
            };
            tokio::try_join!(
                bump(PeriodType::Hourly, input.limits.hourly, hour_start),
                bump(PeriodType::Daily, input.limits.daily, day_start),
                bump(PeriodType::Monthly, input.limits.monthly, month_start),
            )
            .map_err(|e| CheckRateLimitError::Store(e.to_string()))?;
            1
        } else {
            0
        };

        let remaining = remaining_quota(
            &input.limits,
            hourly_count,
            daily_count,
            monthly_count,
            consumed,
        );
        Ok(AdmissionDecision::allowed(remaining, input.limits))
    }
}

fn remaining_quota(
    limits: &RateLimits,
    hourly_count: i64,
    daily_count: i64,
    monthly_count: i64,
    consumed: u64,
) -> RemainingQuota {
    RemainingQuota {
        hourly: remaining_for(limits.hourly, hourly_count, consumed),
        daily: remaining_for(limits.daily, daily_count, consumed),
        monthly: remaining_for(limits.monthly, monthly_count, consumed),
    }
}

fn remaining_for(limit: Limit, count: i64, consumed: u64) -> Option<u64> {
    match limit {
        Limit::Bounded(bound) => Some(bound.saturating_sub(count as u64 + consumed)),
        Limit::Unlimited => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::repository::counter_repository::MockCounterRepository;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn input(limits: RateLimits) -> CheckRateLimitInput {
        CheckRateLimitInput {
            user_id: "user-123".to_string(),
            limits,
            subscription_started_at: None,
        }
    }

    #[tokio::test]
    async fn test_first_request_admitted_with_all_counters_started() {
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count().returning(|_, _, _| Ok(0));
        repo.expect_increment_or_insert()
            .withf(|user_id, period_type, start, _| {
                user_id == "user-123"
                    && match period_type {
                        PeriodType::Hourly => *start == utc(2025, 6, 15, 14, 0, 0),
                        PeriodType::Daily => *start == utc(2025, 6, 15, 0, 0, 0),
                        PeriodType::Monthly => *start == utc(2025, 6, 1, 0, 0, 0),
                    }
            })
            .times(3)
            .returning(|_, _, _, _| Ok(1));

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(RateLimits::bounded(2, 5, 20)), Some(now))
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.status_code, 200);
        assert_eq!(decision.remaining.hourly, Some(1));
        assert_eq!(decision.remaining.daily, Some(4));
        assert_eq!(decision.remaining.monthly, Some(19));
        assert_eq!(decision.limits, RateLimits::bounded(2, 5, 20));
    }

    #[tokio::test]
    async fn test_rejects_at_hourly_boundary_without_incrementing() {
        let now = utc(2025, 6, 15, 14, 59, 59);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count().returning(|_, _, _| Ok(2));
        // No expect_increment_or_insert: any write would panic the mock.

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(RateLimits::bounded(2, 5, 20)), Some(now))
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.status_code, 429);
        assert_eq!(decision.exceeded_limit, Some(PeriodType::Hourly));
        assert_eq!(decision.remaining.hourly, Some(0));
        assert_eq!(decision.remaining.daily, Some(3));
        assert_eq!(decision.remaining.monthly, Some(18));
    }

    #[tokio::test]
    async fn test_new_hour_opens_fresh_window() {
        // The 14:00 window is full; at 15:00 a new counter row starts.
        let now = utc(2025, 6, 15, 15, 0, 0);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count()
            .withf(|_, period_type, start| {
                *period_type != PeriodType::Hourly || *start == utc(2025, 6, 15, 15, 0, 0)
            })
            .returning(|_, period_type, _| match period_type {
                PeriodType::Hourly => Ok(0),
                _ => Ok(2),
            });
        repo.expect_increment_or_insert()
            .times(3)
            .returning(|_, _, _, _| Ok(1));

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(RateLimits::bounded(2, 5, 20)), Some(now))
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining.hourly, Some(1));
    }

    #[tokio::test]
    async fn test_unlimited_periods_are_not_written() {
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count().returning(|_, _, _| Ok(0));
        repo.expect_increment_or_insert()
            .withf(|_, period_type, _, _| *period_type == PeriodType::Hourly)
            .times(1)
            .returning(|_, _, _, _| Ok(1));

        let limits = RateLimits::new(Limit::Bounded(100), Limit::Unlimited, Limit::Unlimited);
        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(limits), Some(now))
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining.hourly, Some(99));
        assert_eq!(decision.remaining.daily, None);
        assert_eq!(decision.remaining.monthly, None);
    }

    #[tokio::test]
    async fn test_rejection_priority_hourly_first() {
        // All three counters would trip their limit; hourly is reported.
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count().returning(|_, _, _| Ok(1));

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(RateLimits::bounded(1, 10, 100)), Some(now))
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.exceeded_limit, Some(PeriodType::Hourly));
    }

    #[tokio::test]
    async fn test_rejection_priority_daily_before_monthly() {
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count()
            .returning(|_, period_type, _| match period_type {
                PeriodType::Hourly => Ok(0),
                PeriodType::Daily => Ok(10),
                PeriodType::Monthly => Ok(100),
            });

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(RateLimits::bounded(5, 10, 100)), Some(now))
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.exceeded_limit, Some(PeriodType::Daily));
    }

    #[tokio::test]
    async fn test_zero_limit_admits_nothing() {
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count().returning(|_, _, _| Ok(0));

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_and_increment(&input(RateLimits::bounded(0, 5, 20)), Some(now))
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.exceeded_limit, Some(PeriodType::Hourly));
        assert_eq!(decision.remaining.hourly, Some(0));
    }

    #[tokio::test]
    async fn test_monthly_window_uses_subscription_anchor() {
        // Anchor day 31, mid-February: the monthly counter key is Jan 31.
        let now = utc(2025, 2, 15, 10, 0, 0);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count()
            .withf(|_, period_type, start| {
                *period_type != PeriodType::Monthly || *start == utc(2025, 1, 31, 0, 0, 0)
            })
            .returning(|_, _, _| Ok(0));
        repo.expect_increment_or_insert()
            .times(3)
            .returning(|_, _, _, _| Ok(1));

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let mut req = input(RateLimits::bounded(2, 5, 20));
        req.subscription_started_at = Some(utc(2025, 1, 31, 0, 0, 0));
        let decision = uc.check_and_increment(&req, Some(now)).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_check_only_does_not_increment() {
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count().returning(|_, _, _| Ok(1));
        // No expect_increment_or_insert: check_only must never write.

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let decision = uc
            .check_only(&input(RateLimits::bounded(2, 5, 20)), Some(now))
            .await
            .unwrap();

        assert!(decision.allowed);
        // Remaining reflects the pre-increment counts.
        assert_eq!(decision.remaining.hourly, Some(1));
        assert_eq!(decision.remaining.daily, Some(4));
        assert_eq!(decision.remaining.monthly, Some(19));
    }

    #[tokio::test]
    async fn test_store_error_surfaces() {
        let now = utc(2025, 6, 15, 14, 30, 45);
        let mut repo = MockCounterRepository::new();
        repo.expect_get_count()
            .returning(|_, _, _| Err(anyhow::anyhow!("connection refused")));

        let uc = CheckRateLimitUseCase::new(Arc::new(repo));
        let result = uc
            .check_and_increment(&input(RateLimits::bounded(2, 5, 20)), Some(now))
            .await;

        assert!(result.is_err());
        match result.unwrap_err() {
            CheckRateLimitError::Store(msg) => assert!(msg.contains("connection refused")),
        }
    }
}

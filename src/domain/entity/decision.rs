use serde::Serialize;

use super::limits::RateLimits;
use crate::domain::period::PeriodType;

/// 各ピリオドの残リクエスト数。上限が Unlimited のピリオドは None となり、
/// JSON 化の際は省略される。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemainingQuota {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u64>,
}

impl RemainingQuota {
    pub fn get(&self, period_type: PeriodType) -> Option<u64> {
        match period_type {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Monthly => self.monthly,
        }
    }
}

/// 1 リクエストに対する許可判定。
///
/// 拒否の場合、exceeded_limit には hourly → daily → monthly の優先順位で
/// 最初に超過したピリオドが入る。
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub status_code: u16,
    pub remaining: RemainingQuota,
    pub exceeded_limit: Option<PeriodType>,
    pub limits: RateLimits,
}

impl AdmissionDecision {
    pub fn allowed(remaining: RemainingQuota, limits: RateLimits) -> Self {
        Self {
            allowed: true,
            status_code: 200,
            remaining,
            exceeded_limit: None,
            limits,
        }
    }

    pub fn denied(remaining: RemainingQuota, exceeded: PeriodType, limits: RateLimits) -> Self {
        Self {
            allowed: false,
            status_code: 429,
            remaining,
            exceeded_limit: Some(exceeded),
            limits,
        }
    }
}

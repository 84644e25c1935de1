use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::period::PeriodType;

/// rate_limit_counters テーブルの 1 行。
///
/// (user_id, period_type, period_start) は一意。period_start は常に
/// Period Calculator が返す正準な開始時刻であり、リクエストの実時刻ではない。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterRow {
    pub id: i64,
    pub user_id: String,
    pub period_type: PeriodType,
    pub period_start: DateTime<Utc>,
    pub request_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 履歴 API が返す 1 ウィンドウ分の集計。period_end は排他的終端。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageWindow {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub request_count: i64,
}

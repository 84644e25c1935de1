use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// カウンターの対象ピリオド種別。rate_limit_counters の period_type 列に対応する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Hourly,
    Daily,
    Monthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
            PeriodType::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(PeriodType::Hourly),
            "daily" => Some(PeriodType::Daily),
            "monthly" => Some(PeriodType::Monthly),
            _ => None,
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// current_hour_start は now を UTC の時の先頭に切り詰める。
pub fn current_hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
        .unwrap()
}

/// next_hour_start は次の時の先頭を返す。日・月・年の繰り上がりを含む。
pub fn next_hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
    current_hour_start(now) + Duration::hours(1)
}

/// current_day_start は now を UTC の 0 時に切り詰める。
pub fn current_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .unwrap()
}

/// next_day_start は翌日の 0 時を返す。月・年の繰り上がりを含む。
pub fn next_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    current_day_start(now) + Duration::days(1)
}

/// subscription_month_start はサブスクリプション月の開始時刻を返す。
///
/// anchor（初回購入日時）の日にちを起点とし、その日が存在しない短い月では
/// 月末日に丸める。anchor が無い場合は暦月の 1 日を返す。
pub fn subscription_month_start(anchor: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let anchor = match anchor {
        Some(a) => a,
        None => {
            return Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .unwrap();
        }
    };

    let anchor_day = anchor.day();
    let this_month = month_start_clamped(now.year(), now.month(), anchor_day);
    if now >= this_month {
        this_month
    } else {
        let (prev_year, prev_month) = previous_month(now.year(), now.month());
        month_start_clamped(prev_year, prev_month, anchor_day)
    }
}

/// next_subscription_month_start は現在のサブスクリプション月の排他的終端、
/// すなわち次のサブスクリプション月の開始時刻を返す。
pub fn next_subscription_month_start(
    anchor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match anchor {
        None => {
            let (next_year, next_month) = following_month(now.year(), now.month());
            Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
                .unwrap()
        }
        Some(anchor) => {
            let current = subscription_month_start(Some(anchor), now);
            let (next_year, next_month) = following_month(current.year(), current.month());
            month_start_clamped(next_year, next_month, anchor.day())
        }
    }
}

/// period_start は指定ピリオドの現在の開始時刻を返す。
pub fn period_start(
    period_type: PeriodType,
    anchor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match period_type {
        PeriodType::Hourly => current_hour_start(now),
        PeriodType::Daily => current_day_start(now),
        PeriodType::Monthly => subscription_month_start(anchor, now),
    }
}

/// period_end は start から始まるピリオドの排他的終端を返す。
pub fn period_end(
    period_type: PeriodType,
    anchor: Option<DateTime<Utc>>,
    start: DateTime<Utc>,
) -> DateTime<Utc> {
    match period_type {
        PeriodType::Hourly => next_hour_start(start),
        PeriodType::Daily => next_day_start(start),
        PeriodType::Monthly => next_subscription_month_start(anchor, start),
    }
}

fn month_start_clamped(year: i32, month: u32, anchor_day: u32) -> DateTime<Utc> {
    let day = anchor_day.min(last_day_of_month(year, month));
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = following_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn following_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

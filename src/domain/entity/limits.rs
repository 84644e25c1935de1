use std::collections::HashMap;

use crate::domain::period::PeriodType;

/// 1 ピリオドあたりのリクエスト上限。
///
/// Unlimited は「上限なし」を表し、Bounded(0)（そのピリオドでは一切許可しない）
/// とは別の値である。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Bounded(u64),
}

impl Limit {
    pub fn from_option(value: Option<u64>) -> Self {
        match value {
            Some(n) => Limit::Bounded(n),
            None => Limit::Unlimited,
        }
    }

    pub fn bound(&self) -> Option<u64> {
        match self {
            Limit::Bounded(n) => Some(*n),
            Limit::Unlimited => None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    /// 上限結合。Unlimited はどの数値上限よりも強く、Bounded 同士は max を取る。
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Limit::Unlimited, _) | (_, Limit::Unlimited) => Limit::Unlimited,
            (Limit::Bounded(a), Limit::Bounded(b)) => Limit::Bounded(a.max(b)),
        }
    }
}

/// 時間・日・サブスクリプション月の 3 ピリオドの上限の組。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub hourly: Limit,
    pub daily: Limit,
    pub monthly: Limit,
}

impl RateLimits {
    pub fn new(hourly: Limit, daily: Limit, monthly: Limit) -> Self {
        Self {
            hourly,
            daily,
            monthly,
        }
    }

    pub fn bounded(hourly: u64, daily: u64, monthly: u64) -> Self {
        Self {
            hourly: Limit::Bounded(hourly),
            daily: Limit::Bounded(daily),
            monthly: Limit::Bounded(monthly),
        }
    }

    pub fn limit_for(&self, period_type: PeriodType) -> Limit {
        match period_type {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Monthly => self.monthly,
        }
    }

    /// フィールドごとの上限結合。
    pub fn join(self, other: Self) -> Self {
        Self {
            hourly: self.hourly.join(other.hourly),
            daily: self.daily.join(other.daily),
            monthly: self.monthly.join(other.monthly),
        }
    }
}

/// エンタイトルメント未保有ユーザーと未知のエンタイトルメント名に適用される
/// フォールバックティアの名前。
pub const NONE_TIER: &str = "none";

/// エンタイトルメント名から上限への対応表。
///
/// 必須の "none" ティアは専用フィールドとして保持し、欠落は構築時に弾く
/// （設定読み込み側が起動エラーにする）。
#[derive(Debug, Clone)]
pub struct RateLimitsConfig {
    none: RateLimits,
    plans: HashMap<String, RateLimits>,
}

impl RateLimitsConfig {
    pub fn new(none: RateLimits, plans: HashMap<String, RateLimits>) -> Self {
        Self { none, plans }
    }

    pub fn none(&self) -> RateLimits {
        self.none
    }

    /// 名前に対応するティアを返す。未知の名前は "none" にフォールバックする。
    pub fn plan(&self, name: &str) -> RateLimits {
        self.plans.get(name).copied().unwrap_or(self.none)
    }

    /// 保有エンタイトルメント集合から実効上限を解決する。
    ///
    /// 空集合は "none"、単一要素はそのティア、複数要素は各ティアの上限結合。
    pub fn resolve(&self, entitlements: &[String]) -> RateLimits {
        entitlements
            .iter()
            .map(|name| self.plan(name))
            .reduce(RateLimits::join)
            .unwrap_or(self.none)
    }
}

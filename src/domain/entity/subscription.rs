use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::limits::NONE_TIER;

/// サブスクリプションプロバイダが返す 1 エンタイトルメント分の生レコード。
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementRecord {
    pub name: String,
    pub purchase_date: DateTime<Utc>,
    #[serde(default)]
    pub expires_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sandbox: bool,
}

/// ユーザーの有効なエンタイトルメント集合と、その最古の購入日時。
///
/// started_at が None になるのは集合が {"none"} の場合に限る。
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSnapshot {
    pub entitlements: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    /// エンタイトルメントを一切持たないユーザーのスナップショット。
    pub fn none() -> Self {
        Self {
            entitlements: vec![NONE_TIER.to_string()],
            started_at: None,
        }
    }

    /// 生レコードからスナップショットを導出する。
    ///
    /// - 失効済み（expires_date が過去）のレコードは除外する
    /// - sandbox レコードは test_mode が有効な場合のみ残す
    /// - started_at は残ったレコードの purchase_date の最小値
    pub fn from_records(
        records: &[EntitlementRecord],
        test_mode: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let active: Vec<&EntitlementRecord> = records
            .iter()
            .filter(|r| r.expires_date.map_or(true, |expires| expires > now))
            .filter(|r| test_mode || !r.sandbox)
            .collect();

        if active.is_empty() {
            return Self::none();
        }

        let started_at = active.iter().map(|r| r.purchase_date).min();
        let entitlements = active.iter().map(|r| r.name.clone()).collect();

        Self {
            entitlements,
            started_at,
        }
    }

    pub fn is_none_tier(&self) -> bool {
        self.started_at.is_none()
    }
}

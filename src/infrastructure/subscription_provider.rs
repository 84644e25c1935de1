use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::entity::subscription::{EntitlementRecord, SubscriptionSnapshot};
use crate::infrastructure::config::ProviderConfig;

/// SubscriptionProviderError はプロバイダ照会に関するエラー。
///
/// 「ユーザーが存在しない」はエラーではなく none スナップショットとして返る。
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionProviderError {
    #[error("provider connection error: {0}")]
    Connection(String),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// SubscriptionProvider はサブスクリプションプロバイダへの照会を抽象化する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// ユーザーの有効なエンタイトルメント集合と最古の購入日時を返す。
    async fn lookup(&self, user_id: &str) -> Result<SubscriptionSnapshot, SubscriptionProviderError>;
}

/// HttpSubscriptionProvider は HTTP API 経由のプロバイダクライアント。
pub struct HttpSubscriptionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    test_mode: bool,
}

impl HttpSubscriptionProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, SubscriptionProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SubscriptionProviderError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            test_mode: config.test_mode,
        })
    }
}

#[async_trait]
impl SubscriptionProvider for HttpSubscriptionProvider {
    async fn lookup(
        &self,
        user_id: &str,
    ) -> Result<SubscriptionSnapshot, SubscriptionProviderError> {
        let url = format!("{}/subscribers/{}", self.base_url, user_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SubscriptionProviderError::Connection(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SubscriptionSnapshot::none());
        }
        if !resp.status().is_success() {
            return Err(SubscriptionProviderError::Status(resp.status().as_u16()));
        }

        let body: SubscriberResponse = resp
            .json()
            .await
            .map_err(|e| SubscriptionProviderError::InvalidResponse(e.to_string()))?;

        Ok(snapshot_from_response(body, self.test_mode, Utc::now()))
    }
}

fn snapshot_from_response(
    body: SubscriberResponse,
    test_mode: bool,
    now: DateTime<Utc>,
) -> SubscriptionSnapshot {
    let records: Vec<EntitlementRecord> = body
        .subscriber
        .entitlements
        .into_iter()
        .map(|(name, e)| EntitlementRecord {
            name,
            purchase_date: e.purchase_date,
            expires_date: e.expires_date,
            sandbox: e.sandbox,
        })
        .collect();
    SubscriptionSnapshot::from_records(&records, test_mode, now)
}

// --- Provider wire format ---

#[derive(Debug, Deserialize)]
struct SubscriberResponse {
    subscriber: SubscriberBody,
}

#[derive(Debug, Deserialize)]
struct SubscriberBody {
    #[serde(default)]
    entitlements: HashMap<String, EntitlementBody>,
}

#[derive(Debug, Deserialize)]
struct EntitlementBody {
    purchase_date: DateTime<Utc>,
    #[serde(default)]
    expires_date: Option<DateTime<Utc>>,
    #[serde(default)]
    sandbox: bool,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_deserialize_subscriber_response() {
        let json = r#"{
            "subscriber": {
                "entitlements": {
                    "pro": {
                        "purchase_date": "2025-01-10T08:30:00Z",
                        "expires_date": "2026-01-10T08:30:00Z"
                    },
                    "beta": {
                        "purchase_date": "2025-03-01T00:00:00Z",
                        "sandbox": true
                    }
                }
            }
        }"#;
        let body: SubscriberResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.subscriber.entitlements.len(), 2);
        assert!(body.subscriber.entitlements["beta"].sandbox);
        assert!(body.subscriber.entitlements["pro"].expires_date.is_some());
    }

    #[test]
    fn test_snapshot_from_response_filters_sandbox() {
        let json = r#"{
            "subscriber": {
                "entitlements": {
                    "beta": {
                        "purchase_date": "2025-03-01T00:00:00Z",
                        "sandbox": true
                    }
                }
            }
        }"#;
        let body: SubscriberResponse = serde_json::from_str(json).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();

        let snapshot = snapshot_from_response(serde_json::from_str(json).unwrap(), false, now);
        assert!(snapshot.is_none_tier());

        let snapshot = snapshot_from_response(body, true, now);
        assert_eq!(snapshot.entitlements, vec!["beta".to_string()]);
    }

    #[test]
    fn test_snapshot_from_empty_entitlements_is_none_tier() {
        let json = r#"{ "subscriber": { "entitlements": {} } }"#;
        let body: SubscriberResponse = serde_json::from_str(json).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();
        let snapshot = snapshot_from_response(body, false, now);
        assert_eq!(snapshot, SubscriptionSnapshot::none());
        assert!(snapshot.started_at.is_none());
    }
}

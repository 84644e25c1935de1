use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::entity::limits::{RateLimits, RateLimitsConfig};
use crate::domain::entity::subscription::SubscriptionSnapshot;
use crate::infrastructure::subscription_provider::SubscriptionProvider;

/// ユーザー 1 人分の解決結果。判定エンジンへの入力になる。
#[derive(Debug, Clone)]
pub struct ResolvedLimits {
    pub limits: RateLimits,
    pub entitlements: Vec<String>,
    pub subscription_started_at: Option<DateTime<Utc>>,
}

/// ResolveLimitsUseCase はプロバイダ照会とティア解決を合成する。
///
/// プロバイダ照会の失敗はエラーにせず "none" スナップショットに
/// フォールバックする。エンジン側でのリトライは行わない。
pub struct ResolveLimitsUseCase {
    provider: Arc<dyn SubscriptionProvider>,
    limits_config: RateLimitsConfig,
}

impl ResolveLimitsUseCase {
    pub fn new(provider: Arc<dyn SubscriptionProvider>, limits_config: RateLimitsConfig) -> Self {
        Self {
            provider,
            limits_config,
        }
    }

    pub async fn execute(&self, user_id: &str) -> ResolvedLimits {
        let snapshot = match self.provider.lookup(user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "subscription lookup failed, falling back to the none tier"
                );
                SubscriptionSnapshot::none()
            }
        };

        let limits = self.limits_config.resolve(&snapshot.entitlements);
        ResolvedLimits {
            limits,
            entitlements: snapshot.entitlements,
            subscription_started_at: snapshot.started_at,
        }
    }
}

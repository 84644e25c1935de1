use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::error;

use crate::domain::entity::decision::{AdmissionDecision, RemainingQuota};
use crate::usecase::check_rate_limit::{CheckRateLimitInput, CheckRateLimitUseCase};
use crate::usecase::resolve_limits::ResolveLimitsUseCase;

/// リクエストからレートリミット対象のユーザー ID を取り出すフック。
/// None を返した場合、リクエストは 401 で拒否される。
pub type UserIdExtractor = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// レートリミットを適用せず素通しするリクエストを判定するフック。
pub type SkipPredicate = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;

/// RateLimitState はミドルウェアが参照する共有状態。
#[derive(Clone)]
pub struct RateLimitState {
    resolve_uc: Arc<ResolveLimitsUseCase>,
    check_uc: Arc<CheckRateLimitUseCase>,
    extract_user_id: UserIdExtractor,
    should_skip: Option<SkipPredicate>,
}

impl RateLimitState {
    /// デフォルトでは x-user-id ヘッダからユーザー ID を取り出す。
    pub fn new(resolve_uc: Arc<ResolveLimitsUseCase>, check_uc: Arc<CheckRateLimitUseCase>) -> Self {
        Self {
            resolve_uc,
            check_uc,
            extract_user_id: Arc::new(|req| {
                req.headers()
                    .get("x-user-id")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            }),
            should_skip: None,
        }
    }

    pub fn with_extractor(mut self, extract_user_id: UserIdExtractor) -> Self {
        self.extract_user_id = extract_user_id;
        self
    }

    pub fn with_skip(mut self, should_skip: SkipPredicate) -> Self {
        self.should_skip = Some(should_skip);
        self
    }
}

/// enforce はレートリミットミドルウェアのファクトリ。
/// axum::middleware::from_fn と組み合わせて使用する。
///
/// 処理順: skip 判定 → ユーザー ID 抽出 → エンタイトルメント解決
/// （失敗時は "none" ティアにフォールバック）→ チェック & カウンター加算。
pub fn enforce(
    state: RateLimitState,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone {
    move |req: Request<Body>, next: Next| {
        let state = state.clone();
        Box::pin(rate_limit_check(state, req, next))
    }
}

async fn rate_limit_check(state: RateLimitState, req: Request<Body>, next: Next) -> Response {
    if let Some(ref should_skip) = state.should_skip {
        if should_skip(&req) {
            return next.run(req).await;
        }
    }

    let user_id = match (state.extract_user_id)(&req) {
        Some(id) => id,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": {
                        "code": "SYS_RATELIMIT_MISSING_USER",
                        "message": "A user identity is required for rate limiting."
                    }
                })),
            )
                .into_response();
        }
    };

    let resolved = state.resolve_uc.execute(&user_id).await;
    let input = CheckRateLimitInput {
        user_id,
        limits: resolved.limits,
        subscription_started_at: resolved.subscription_started_at,
    };

    let decision = match state.check_uc.check_and_increment(&input, None).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(user_id = %input.user_id, error = %e, "rate limit check failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": {
                        "code": "SYS_RATELIMIT_STORE_ERROR",
                        "message": "Rate limit state is temporarily unavailable."
                    }
                })),
            )
                .into_response();
        }
    };

    if decision.allowed {
        let mut response = next.run(req).await;
        apply_remaining_headers(response.headers_mut(), &decision);
        response
    } else {
        rejection_response(&decision)
    }
}

/// 上限が有限のピリオドについて X-RateLimit-*-Remaining ヘッダを設定する。
/// ヘッダが無いことは、そのピリオドの上限が無制限であることを意味する。
pub(crate) fn apply_remaining_headers(headers: &mut HeaderMap, decision: &AdmissionDecision) {
    let pairs = [
        ("x-ratelimit-hourly-remaining", decision.remaining.hourly),
        ("x-ratelimit-daily-remaining", decision.remaining.daily),
        ("x-ratelimit-monthly-remaining", decision.remaining.monthly),
    ];
    for (name, value) in pairs {
        if let Some(value) = value {
            headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
        }
    }
}

/// 429 レスポンスボディ。
#[derive(Debug, Serialize)]
pub struct RateLimitExceededBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub remaining: RemainingQuota,
    #[serde(rename = "exceededLimit")]
    pub exceeded_limit: String,
    pub timestamp: String,
}

/// 拒否判定を 429 レスポンスに変換する。レートリミットヘッダも併せて付与する。
pub(crate) fn rejection_response(decision: &AdmissionDecision) -> Response {
    let period = decision
        .exceeded_limit
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let body = RateLimitExceededBody {
        success: false,
        error: "Rate limit exceeded".to_string(),
        message: format!(
            "You have exceeded your {} request limit. Please try again later or upgrade your subscription.",
            period
        ),
        remaining: decision.remaining,
        exceeded_limit: period,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    let status = StatusCode::from_u16(decision.status_code)
        .unwrap_or(StatusCode::TOO_MANY_REQUESTS);
    let mut response = (status, Json(body)).into_response();
    apply_remaining_headers(response.headers_mut(), decision);
    response
}

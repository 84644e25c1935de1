use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AppState, ErrorResponse};
use crate::adapter::middleware::rate_limit::{apply_remaining_headers, rejection_response};
use crate::domain::entity::counter::UsageWindow;
use crate::domain::entity::decision::AdmissionDecision;
use crate::domain::entity::limits::RateLimits;
use crate::domain::period::PeriodType;
use crate::usecase::check_rate_limit::CheckRateLimitInput;
use crate::usecase::get_usage_history::GetUsageHistoryInput;

#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Health check OK"),
    )
)]
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "Not ready"),
    )
)]
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut db_status = "skipped";
    let mut overall_ok = true;

    if let Some(ref pool) = state.db_pool {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => db_status = "ok",
            Err(_) => {
                db_status = "error";
                overall_ok = false;
            }
        }
    }

    let status_code = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(serde_json::json!({
            "status": if overall_ok { "ready" } else { "not ready" },
            "checks": {
                "database": db_status
            }
        })),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus metrics"),
    )
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// POST /api/v1/ratelimit/check のリクエストボディ。
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CheckRateLimitRequest {
    pub user_id: String,
}

/// 許可判定のレスポンスボディ。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CheckRateLimitResponse {
    pub allowed: bool,
    pub entitlements: Vec<String>,
    pub limits: LimitsDto,
    pub remaining: RemainingDto,
}

impl CheckRateLimitResponse {
    fn new(decision: &AdmissionDecision, entitlements: Vec<String>) -> Self {
        Self {
            allowed: decision.allowed,
            entitlements,
            limits: LimitsDto::from(decision.limits),
            remaining: RemainingDto {
                hourly: decision.remaining.hourly,
                daily: decision.remaining.daily,
                monthly: decision.remaining.monthly,
            },
        }
    }
}

/// ピリオドごとの上限。省略されたフィールドは無制限を意味する。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LimitsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u64>,
}

impl From<RateLimits> for LimitsDto {
    fn from(limits: RateLimits) -> Self {
        Self {
            hourly: limits.hourly.bound(),
            daily: limits.daily.bound(),
            monthly: limits.monthly.bound(),
        }
    }
}

/// ピリオドごとの残リクエスト数。省略されたフィールドは無制限を意味する。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RemainingDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/ratelimit/check",
    request_body = CheckRateLimitRequest,
    responses(
        (status = 200, description = "Request admitted, counters advanced", body = CheckRateLimitResponse),
        (status = 429, description = "Rate limit exceeded, counters unchanged"),
        (status = 500, description = "Counter store unavailable", body = ErrorResponse),
    )
)]
pub async fn check_rate_limit(
    State(state): State<AppState>,
    Json(req): Json<CheckRateLimitRequest>,
) -> impl IntoResponse {
    let resolved = state.resolve_uc.execute(&req.user_id).await;
    let input = CheckRateLimitInput {
        user_id: req.user_id,
        limits: resolved.limits,
        subscription_started_at: resolved.subscription_started_at,
    };

    match state.check_uc.check_and_increment(&input, None).await {
        Ok(decision) => {
            let outcome = if decision.allowed { "allowed" } else { "rejected" };
            let period = decision
                .exceeded_limit
                .map(|p| p.as_str())
                .unwrap_or("none");
            state.metrics.record_admission(outcome, period);

            if decision.allowed {
                let body = CheckRateLimitResponse::new(&decision, resolved.entitlements);
                let mut response = (StatusCode::OK, Json(body)).into_response();
                apply_remaining_headers(response.headers_mut(), &decision);
                response
            } else {
                rejection_response(&decision)
            }
        }
        Err(e) => {
            let err = ErrorResponse::new("SYS_RATELIMIT_CHECK_FAILED", &e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/ratelimit/users/{user_id}/status",
    params(
        ("user_id" = String, Path, description = "User identifier"),
    ),
    responses(
        (status = 200, description = "Current admission status without advancing counters", body = CheckRateLimitResponse),
        (status = 500, description = "Counter store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_user_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let resolved = state.resolve_uc.execute(&user_id).await;
    let input = CheckRateLimitInput {
        user_id,
        limits: resolved.limits,
        subscription_started_at: resolved.subscription_started_at,
    };

    match state.check_uc.check_only(&input, None).await {
        Ok(decision) => {
            let body = CheckRateLimitResponse::new(&decision, resolved.entitlements);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            let err = ErrorResponse::new("SYS_RATELIMIT_STATUS_FAILED", &e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
        }
    }
}

/// GET /api/v1/ratelimit/users/:user_id/history のクエリパラメータ。
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct UsageHistoryParams {
    /// "hourly" | "daily" | "monthly"
    pub period_type: String,
    /// 取得する過去ウィンドウ数の上限（デフォルト 100）
    pub limit: Option<i64>,
}

/// 履歴のレスポンスボディ。ウィンドウは新しい順。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UsageHistoryResponse {
    pub user_id: String,
    pub period_type: String,
    pub windows: Vec<UsageWindowDto>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UsageWindowDto {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub request_count: i64,
}

impl From<UsageWindow> for UsageWindowDto {
    fn from(window: UsageWindow) -> Self {
        Self {
            period_start: window.period_start,
            period_end: window.period_end,
            request_count: window.request_count,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/ratelimit/users/{user_id}/history",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        UsageHistoryParams,
    ),
    responses(
        (status = 200, description = "Past usage windows, most recent first", body = UsageHistoryResponse),
        (status = 400, description = "Unknown period type", body = ErrorResponse),
        (status = 500, description = "Counter store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_usage_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<UsageHistoryParams>,
) -> impl IntoResponse {
    let period_type = match PeriodType::from_str(&params.period_type) {
        Some(period_type) => period_type,
        None => {
            let err = ErrorResponse::new(
                "SYS_RATELIMIT_INVALID_PERIOD",
                &format!("unknown period_type: {}", params.period_type),
            );
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    // 月次ウィンドウの終端はサブスクリプション開始日に依存する
    let resolved = state.resolve_uc.execute(&user_id).await;
    let input = GetUsageHistoryInput {
        user_id: user_id.clone(),
        period_type,
        subscription_started_at: resolved.subscription_started_at,
        limit: params.limit,
    };

    match state.history_uc.execute(&input).await {
        Ok(windows) => {
            let body = UsageHistoryResponse {
                user_id,
                period_type: period_type.as_str().to_string(),
                windows: windows.into_iter().map(UsageWindowDto::from).collect(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            let err = ErrorResponse::new("SYS_RATELIMIT_HISTORY_FAILED", &e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
        }
    }
}

pub mod ratelimit_handler;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::infrastructure::metrics::Metrics;
use crate::usecase::{CheckRateLimitUseCase, GetUsageHistoryUseCase, ResolveLimitsUseCase};

/// AppState はアプリケーション全体の共有状態を表す。
#[derive(Clone)]
pub struct AppState {
    pub check_uc: Arc<CheckRateLimitUseCase>,
    pub resolve_uc: Arc<ResolveLimitsUseCase>,
    pub history_uc: Arc<GetUsageHistoryUseCase>,
    pub metrics: Arc<Metrics>,
    pub db_pool: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(
        check_uc: Arc<CheckRateLimitUseCase>,
        resolve_uc: Arc<ResolveLimitsUseCase>,
        history_uc: Arc<GetUsageHistoryUseCase>,
        db_pool: Option<sqlx::PgPool>,
    ) -> Self {
        Self {
            check_uc,
            resolve_uc,
            history_uc,
            metrics: Arc::new(Metrics::new("userlimit-server")),
            db_pool,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        ratelimit_handler::healthz,
        ratelimit_handler::readyz,
        ratelimit_handler::metrics,
        ratelimit_handler::check_rate_limit,
        ratelimit_handler::get_user_status,
        ratelimit_handler::get_usage_history,
    ),
    components(schemas(
        ratelimit_handler::CheckRateLimitRequest,
        ratelimit_handler::CheckRateLimitResponse,
        ratelimit_handler::LimitsDto,
        ratelimit_handler::RemainingDto,
        ratelimit_handler::UsageHistoryResponse,
        ratelimit_handler::UsageWindowDto,
        ErrorResponse,
        ErrorBody,
    )),
)]
struct ApiDoc;

/// Build the REST API router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(ratelimit_handler::healthz))
        .route("/readyz", get(ratelimit_handler::readyz))
        .route("/metrics", get(ratelimit_handler::metrics));

    let api_routes = Router::new()
        .route(
            "/api/v1/ratelimit/check",
            post(ratelimit_handler::check_rate_limit),
        )
        .route(
            "/api/v1/ratelimit/users/:user_id/status",
            get(ratelimit_handler::get_user_status),
        )
        .route(
            "/api/v1/ratelimit/users/:user_id/history",
            get(ratelimit_handler::get_usage_history),
        );

    public_routes
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_http,
        ))
        .with_state(state)
}

/// HTTP リクエストカウンタを記録するレイヤ。
async fn track_http(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    state
        .metrics
        .record_http_request(&method, &path, response.status().as_str());
    response
}

/// ErrorResponse は統一エラーレスポンス。
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use userlimit_server::adapter::handler::{self, AppState};
use userlimit_server::adapter::repository::counter_postgres::CounterPostgresRepository;
use userlimit_server::domain::entity::counter::CounterRow;
use userlimit_server::domain::period::PeriodType;
use userlimit_server::domain::repository::CounterRepository;
use userlimit_server::infrastructure::config::Config;
use userlimit_server::infrastructure::subscription_provider::{
    HttpSubscriptionProvider, SubscriptionProvider,
};
use userlimit_server::infrastructure::telemetry;
use userlimit_server::usecase::{
    CheckRateLimitUseCase, GetUsageHistoryUseCase, ResolveLimitsUseCase,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;

    // Telemetry
    telemetry::init_logger(&cfg.app.environment);

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting userlimit server"
    );

    // "none" ティアを欠く設定では起動しない
    let limits_config = cfg.rate_limits_config()?;

    // Database pool (optional)
    let db_pool = if let Some(ref db_config) = cfg.database {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| db_config.url.clone());
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(db_config.max_connections)
            .min_connections(db_config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                db_config.connect_timeout_seconds,
            ))
            .connect(&url)
            .await?;
        info!("database connection pool established");
        Some(pool)
    } else if let Ok(url) = std::env::var("DATABASE_URL") {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await?;
        info!("database connection pool established from DATABASE_URL");
        Some(pool)
    } else {
        info!("no database configured, using in-memory counter store");
        None
    };

    // Repositories
    let counter_repo: Arc<dyn CounterRepository> = match db_pool {
        Some(ref pool) => Arc::new(CounterPostgresRepository::new(pool.clone())),
        None => Arc::new(InMemoryCounterRepository::new()),
    };

    // Subscription provider
    let provider: Arc<dyn SubscriptionProvider> =
        Arc::new(HttpSubscriptionProvider::new(&cfg.provider)?);

    // Use cases
    let check_uc = Arc::new(CheckRateLimitUseCase::new(counter_repo.clone()));
    let resolve_uc = Arc::new(ResolveLimitsUseCase::new(provider, limits_config));
    let history_uc = Arc::new(GetUsageHistoryUseCase::new(counter_repo));

    // Router
    let state = AppState::new(check_uc, resolve_uc, history_uc, db_pool);
    let app = handler::router(state);

    let addr: std::net::SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("REST server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- In-memory implementation for dev mode ---

struct InMemoryCounterRepository {
    rows: tokio::sync::RwLock<Vec<CounterRow>>,
}

impl InMemoryCounterRepository {
    fn new() -> Self {
        Self {
            rows: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CounterRepository for InMemoryCounterRepository {
    async fn get_count(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| {
                r.user_id == user_id
                    && r.period_type == period_type
                    && r.period_start == period_start
            })
            .map(|r| r.request_count)
            .unwrap_or(0))
    }

    async fn increment_or_insert(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| {
            r.user_id == user_id && r.period_type == period_type && r.period_start == period_start
        }) {
            row.request_count += 1;
            row.updated_at = now;
            Ok(row.request_count)
        } else {
            let id = rows.len() as i64 + 1;
            rows.push(CounterRow {
                id,
                user_id: user_id.to_string(),
                period_type,
                period_start,
                request_count: 1,
                created_at: now,
                updated_at: now,
            });
            Ok(1)
        }
    }

    async fn history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        limit: i64,
    ) -> anyhow::Result<Vec<CounterRow>> {
        let rows = self.rows.read().await;
        let mut matched: Vec<CounterRow> = rows
            .iter()
            .filter(|r| r.user_id == user_id && r.period_type == period_type)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }
}

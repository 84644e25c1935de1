pub mod check_rate_limit;
pub mod get_usage_history;
pub mod resolve_limits;

pub use check_rate_limit::{CheckRateLimitInput, CheckRateLimitUseCase};
pub use get_usage_history::{GetUsageHistoryInput, GetUsageHistoryUseCase};
pub use resolve_limits::{ResolveLimitsUseCase, ResolvedLimits};

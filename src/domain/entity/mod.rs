pub mod counter;
pub mod decision;
pub mod limits;
pub mod subscription;

pub use counter::{CounterRow, UsageWindow};
pub use decision::{AdmissionDecision, RemainingQuota};
pub use limits::{Limit, RateLimits, RateLimitsConfig, NONE_TIER};
pub use subscription::{EntitlementRecord, SubscriptionSnapshot};

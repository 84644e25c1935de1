pub mod config;
pub mod metrics;
pub mod subscription_provider;
pub mod telemetry;

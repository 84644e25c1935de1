use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::entity::limits::{Limit, RateLimits, RateLimitsConfig, NONE_TIER};

/// Application configuration for userlimit server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    pub provider: ProviderConfig,
    pub rate_limits: HashMap<String, RateLimitsEntry>,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }

    /// rate_limits セクションをドメインの RateLimitsConfig に変換する。
    /// "none" ティアの欠落は起動時エラーとする（暗黙のフォールバックはしない）。
    pub fn rate_limits_config(&self) -> anyhow::Result<RateLimitsConfig> {
        let mut plans: HashMap<String, RateLimits> = self
            .rate_limits
            .iter()
            .map(|(name, entry)| (name.clone(), entry.to_limits()))
            .collect();
        let none = plans
            .remove(NONE_TIER)
            .ok_or_else(|| anyhow::anyhow!("rate_limits config must define the \"none\" tier"))?;
        Ok(RateLimitsConfig::new(none, plans))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8099
}

/// DatabaseConfig はデータベース接続の設定を表す（URL形式）。
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_seconds() -> u64 {
    5
}

/// ProviderConfig はサブスクリプションプロバイダ接続の設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_provider_timeout_seconds")]
    pub timeout_seconds: u64,
    /// sandbox のエンタイトルメントを有効として扱うか。
    #[serde(default)]
    pub test_mode: bool,
}

fn default_provider_timeout_seconds() -> u64 {
    5
}

/// 1 ティア分の上限設定。省略されたピリオドは無制限を意味する。
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitsEntry {
    #[serde(default)]
    pub hourly: Option<u64>,
    #[serde(default)]
    pub daily: Option<u64>,
    #[serde(default)]
    pub monthly: Option<u64>,
}

impl RateLimitsEntry {
    pub fn to_limits(&self) -> RateLimits {
        RateLimits::new(
            Limit::from_option(self.hourly),
            Limit::from_option(self.daily),
            Limit::from_option(self.monthly),
        )
    }
}

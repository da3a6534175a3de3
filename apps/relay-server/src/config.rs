//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use relay_core::domain::QuotaTable;
use relay_infra::abuse::{AbuseGateConfig, DEFAULT_VERDICT_TTL, parse_flag};
use relay_infra::rate_limit::RateLimitConfig;

#[cfg(feature = "redis")]
use relay_infra::cache::RedisConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    /// JSON quota table replacing the built-in one.
    pub quotas_file: Option<PathBuf>,
    pub abuse: AbuseGateConfig,
    pub oracle: OracleConfig,
    /// Set when `REDIS_URL` is present.
    #[cfg(feature = "redis")]
    pub redis: Option<RedisConfig>,
}

/// Anti-abuse oracle connection settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub url: String,
    pub abbreviated: bool,
    pub verdict_ttl: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let abuse = AbuseGateConfig::from_env().map_err(anyhow::Error::msg)?;

        let abbreviated = match env::var("AAO_ABBREVIATED") {
            Ok(raw) => parse_flag(&raw)
                .map_err(anyhow::Error::msg)
                .context("AAO_ABBREVIATED")?,
            Err(_) => false,
        };

        let verdict_ttl = match env::var("AAO_VERDICT_TTL_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => anyhow::bail!("AAO_VERDICT_TTL_SECS must be non-zero"),
                Ok(secs) => Duration::from_secs(secs),
                Err(e) => anyhow::bail!("AAO_VERDICT_TTL_SECS: {e}"),
            },
            Err(_) => DEFAULT_VERDICT_TTL,
        };

        let oracle = OracleConfig {
            url: env::var("AAO_URL").unwrap_or_else(|_| "http://localhost:8000".to_string()),
            abbreviated,
            verdict_ttl,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            rate_limit: RateLimitConfig::from_env(),
            quotas_file: env::var("RELAY_QUOTAS_FILE").ok().map(PathBuf::from),
            abuse,
            oracle,
            #[cfg(feature = "redis")]
            redis: env::var("REDIS_URL").ok().map(|_| RedisConfig::from_env()),
        })
    }

    /// The quota table from `RELAY_QUOTAS_FILE`, or the built-in relay table.
    pub fn quota_table(&self) -> anyhow::Result<QuotaTable> {
        let Some(path) = &self.quotas_file else {
            return Ok(QuotaTable::relay_defaults());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading quota table {}", path.display()))?;
        QuotaTable::from_json(&raw)
            .with_context(|| format!("parsing quota table {}", path.display()))
    }
}

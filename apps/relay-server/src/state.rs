//! Application state - shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use relay_core::ports::{Cache, RelayRateLimiter};
use relay_infra::abuse::{AbuseGate, HttpAbuseOracle, VerdictCache};
use relay_infra::cache::InMemoryCache;
use relay_infra::rate_limit::InMemoryRelayRateLimiter;

use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<dyn RelayRateLimiter>,
    pub abuse_gate: AbuseGate,
}

impl AppState {
    /// Build the application state. Fails on an invalid quota table or oracle URL.
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let quotas = config.quota_table()?;
        let rate_limiter = Arc::new(InMemoryRelayRateLimiter::new(
            &quotas,
            config.rate_limit.clone(),
        )?);
        spawn_bucket_purge(rate_limiter.clone(), config.rate_limit.window);

        let cache = Self::verdict_backend(config).await?;
        let verdicts = VerdictCache::new(cache, config.oracle.verdict_ttl);

        let oracle = HttpAbuseOracle::new(&config.oracle.url)?
            .with_abbreviated(config.oracle.abbreviated);
        let abuse_gate = AbuseGate::new(config.abuse.clone(), Arc::new(oracle), verdicts);

        if !config.abuse.enabled {
            tracing::warn!("Anti-abuse gate disabled (AAO_ENABLED=false)");
        }
        tracing::info!(oracle = %config.oracle.url, "Application state initialized");

        Ok(Self {
            rate_limiter,
            abuse_gate,
        })
    }

    #[cfg(feature = "redis")]
    async fn verdict_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn Cache>> {
        use relay_infra::cache::RedisCache;

        let Some(redis) = &config.redis else {
            tracing::warn!("REDIS_URL not set. Abuse verdicts are cached per instance.");
            return Ok(memory_backend(config.oracle.verdict_ttl));
        };

        match RedisCache::new(redis.clone()).await {
            Ok(cache) => Ok(Arc::new(cache)),
            Err(e) if redis.fallback_to_memory => {
                tracing::error!(
                    "Failed to connect to Redis: {}. Using in-memory verdict cache.",
                    e
                );
                Ok(memory_backend(config.oracle.verdict_ttl))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn verdict_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn Cache>> {
        tracing::info!("Running without redis feature - using in-memory verdict cache");
        Ok(memory_backend(config.oracle.verdict_ttl))
    }
}

/// In-memory verdict cache with its purge ticker running.
fn memory_backend(ttl: Duration) -> Arc<dyn Cache> {
    let cache = Arc::new(InMemoryCache::new());
    spawn_verdict_purge(cache.clone(), ttl);
    cache
}

/// Periodically drop expired per-key windows so idle signers don't accumulate.
fn spawn_bucket_purge(limiter: Arc<InMemoryRelayRateLimiter>, window: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.purge_expired();
        }
    });
}

/// Periodically drop expired verdicts for handles that are never read again.
fn spawn_verdict_purge(cache: Arc<InMemoryCache>, ttl: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cache.purge_expired().await;
        }
    });
}

//! In-memory relay rate limiter: one shared, tier-weighted bucket per operation.
//!
//! Each operation's bucket holds `capacity = lcm(owner, app, allowlist)` points per
//! window. A call at tier `t` costs `capacity / quota_t` points, so a key drawing only
//! from one tier is admitted exactly `quota_t` times per window.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use relay_core::domain::{OperationQuota, QuotaTable, RateLimiterKey, Tier};
use relay_core::QuotaError;
use relay_core::ports::{BlockExpiry, RateLimitError, RateLimitOutcome, RelayRateLimiter};

const DEFAULT_WINDOW_SECS: u64 = 60 * 60;

/// In-memory rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window duration shared by every operation.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            window: Duration::from_secs(
                std::env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WINDOW_SECS),
            ),
        }
    }
}

/// State of one `(tier, signer)` entry.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Window { remaining: u64, resets_at: Instant },
    /// Zero-quota tier. Independent of the window.
    Forbidden,
}

impl Slot {
    fn lapsed(&self, now: Instant) -> bool {
        match self {
            Self::Window { resets_at, .. } => *resets_at <= now,
            Self::Forbidden => false,
        }
    }
}

struct Bucket {
    quota: OperationQuota,
    capacity: u64,
    entries: DashMap<(Tier, String), Slot>,
}

impl Bucket {
    fn cost(&self, tier: Tier) -> Option<u64> {
        match u64::from(self.quota.for_tier(tier)) {
            0 => None,
            quota => Some(self.capacity / quota),
        }
    }
}

/// Per-process rate limiter. Limits are not shared across relay instances.
pub struct InMemoryRelayRateLimiter {
    buckets: HashMap<String, Bucket>,
    window: Duration,
}

impl InMemoryRelayRateLimiter {
    /// Build one bucket per operation in `table`.
    ///
    /// Fails if any operation has no non-zero tier or its capacity overflows.
    pub fn new(table: &QuotaTable, config: RateLimitConfig) -> Result<Self, RateLimitError> {
        if config.window.is_zero() {
            return Err(RateLimitError::Configuration(
                "rate limit window must be non-zero".to_string(),
            ));
        }

        let mut buckets = HashMap::with_capacity(table.len());
        for (operation, quota) in table.iter() {
            let capacity = quota.capacity().ok_or_else(|| QuotaError::NoCapacity {
                operation: operation.to_string(),
                owner: quota.owner,
                app: quota.app,
                allowlist: quota.allowlist,
            })?;

            tracing::debug!(operation, capacity, "Rate limiter bucket created");

            buckets.insert(
                operation.to_string(),
                Bucket {
                    quota: *quota,
                    capacity,
                    entries: DashMap::new(),
                },
            );
        }

        tracing::info!(
            operations = buckets.len(),
            window_secs = config.window.as_secs(),
            "Relay rate limiter initialized"
        );

        Ok(Self {
            buckets,
            window: config.window,
        })
    }

    /// Bucket capacity for `operation`.
    pub fn capacity(&self, operation: &str) -> Option<u64> {
        self.buckets.get(operation).map(|b| b.capacity)
    }

    /// Points charged per call; `None` for unknown operations and zero-quota tiers.
    pub fn cost(&self, operation: &str, tier: Tier) -> Option<u64> {
        self.buckets.get(operation)?.cost(tier)
    }

    /// Clear every key.
    pub fn reset(&self) {
        for bucket in self.buckets.values() {
            bucket.entries.clear();
        }
    }

    /// Drop lapsed windows and every `Forbidden` marker.
    ///
    /// A zero-quota tier stays blocked without its marker: the quota table is fixed for the
    /// limiter's lifetime and the marker is recreated on the next attempt.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        for bucket in self.buckets.values() {
            bucket
                .entries
                .retain(|_, slot| matches!(slot, Slot::Window { .. }) && !slot.lapsed(now));
        }
    }

    /// Synchronous check-and-deduct. The entry's shard lock is held for the whole step.
    pub fn consume_now(&self, key: &RateLimiterKey) -> Result<RateLimitOutcome, RateLimitError> {
        let bucket = self
            .buckets
            .get(&key.operation)
            .ok_or_else(|| RateLimitError::UnknownOperation(key.operation.clone()))?;

        let now = Instant::now();
        let cost = bucket.cost(key.tier);
        let fresh = match cost {
            Some(_) => Slot::Window {
                remaining: bucket.capacity,
                resets_at: now + self.window,
            },
            None => Slot::Forbidden,
        };

        let mut slot = bucket
            .entries
            .entry((key.tier, key.signer.clone()))
            .or_insert(fresh);
        if slot.lapsed(now) {
            *slot = fresh;
        }

        let (Slot::Window { remaining, resets_at }, Some(cost)) = (&mut *slot, cost) else {
            tracing::warn!(
                operation = %key.operation,
                tier = %key.tier,
                signer = %key.signer,
                "Blocked action attempted"
            );
            return Ok(RateLimitOutcome::Blocked {
                expiry: BlockExpiry::Never,
            });
        };

        let reset_after = resets_at.saturating_duration_since(now);
        if *remaining < cost {
            return Ok(RateLimitOutcome::Blocked {
                expiry: BlockExpiry::After(reset_after),
            });
        }

        *remaining -= cost;
        Ok(RateLimitOutcome::Admitted {
            remaining: *remaining,
            reset_after,
        })
    }
}

#[async_trait]
impl RelayRateLimiter for InMemoryRelayRateLimiter {
    async fn consume(&self, key: &RateLimiterKey) -> Result<RateLimitOutcome, RateLimitError> {
        self.consume_now(key)
    }
}

//! # Relay Infrastructure
//!
//! Concrete implementations of the ports defined in `relay-core`:
//! the tier-weighted rate limiter, verdict caches and the anti-abuse gate.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-memory only
//! - `redis` - Redis-backed verdict cache shared across relay instances

pub mod abuse;
pub mod cache;
pub mod rate_limit;

// Re-exports - In-Memory
pub use abuse::{
    AbuseCheck, AbuseDecision, AbuseGate, AbuseGateConfig, HttpAbuseOracle, VerdictCache,
};
pub use cache::InMemoryCache;
pub use rate_limit::{InMemoryRelayRateLimiter, RateLimitConfig};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use cache::{RedisCache, RedisConfig};

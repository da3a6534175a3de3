//! Rate limiting port.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::RateLimiterKey;
use crate::error::QuotaError;

/// Per-operation, tier-weighted rate limiter.
#[async_trait]
pub trait RelayRateLimiter: Send + Sync {
    /// Atomically charge one call for `key` against its operation's bucket.
    ///
    /// A block is an outcome, not an error. Errors mean the operation is not
    /// rate-limited at all, which is a deployment mismatch.
    async fn consume(&self, key: &RateLimiterKey) -> Result<RateLimitOutcome, RateLimitError>;
}

/// Result of a consume call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Admitted {
        /// Points left in this key's window.
        remaining: u64,
        reset_after: Duration,
    },
    Blocked { expiry: BlockExpiry },
}

/// How long a blocked key stays blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockExpiry {
    /// Window exhausted; lifts when the window resets.
    After(Duration),
    /// Tier has a zero quota for this operation; never lifts until reset or restart.
    Never,
}

impl RateLimitOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Time until the caller may retry; `None` when admitted or permanently blocked.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Blocked {
                expiry: BlockExpiry::After(wait),
            } => Some(*wait),
            _ => None,
        }
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit not found | {0} not configured")]
    UnknownOperation(String),

    #[error("Rate limiter configuration invalid: {0}")]
    Configuration(String),

    #[error(transparent)]
    Quota(#[from] QuotaError),
}

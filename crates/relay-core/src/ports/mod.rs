//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod abuse_oracle;
mod cache;
mod rate_limit;

pub use abuse_oracle::{AbuseOracle, OracleError};
pub use cache::{Cache, CacheError};
pub use rate_limit::{BlockExpiry, RateLimitError, RateLimitOutcome, RelayRateLimiter};

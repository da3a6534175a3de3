//! Rate limiting implementations.

mod memory;

pub use memory::{InMemoryRelayRateLimiter, RateLimitConfig};

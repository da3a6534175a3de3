use async_trait::async_trait;
use std::time::Duration;

/// String key-value cache with per-entry TTL (Redis, in-memory).
///
/// Absence after expiry is indistinguishable from a key that was never set.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a live value. Expired entries read as `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replace a value, resetting its TTL. `None` keeps it until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Delete a key from the cache.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

//! Typed abuse verdict storage over any [`Cache`] backend.

use std::sync::Arc;
use std::time::Duration;

use relay_core::domain::AbuseVerdict;
use relay_core::ports::{Cache, CacheError};

const KEY_PREFIX: &str = "aao";

/// Default lifetime of a cached verdict.
pub const DEFAULT_VERDICT_TTL: Duration = Duration::from_secs(60 * 60);

/// Last known verdict per user handle, stored as JSON with a TTL.
///
/// Reads are open to anyone holding a handle; only the abuse gate writes.
#[derive(Clone)]
pub struct VerdictCache {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl VerdictCache {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(handle: &str) -> String {
        format!("{KEY_PREFIX}:{handle}")
    }

    /// Read the verdict for `handle`. Backend failures and undecodable entries read as a miss.
    pub async fn read(&self, handle: &str) -> Option<AbuseVerdict> {
        let raw = match self.cache.get(&Self::key(handle)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(handle, error = %e, "Verdict cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(handle, error = %e, "Discarding undecodable cached verdict");
                None
            }
        }
    }

    /// Replace the verdict for `handle`, restarting its TTL.
    pub(crate) async fn store(
        &self,
        handle: &str,
        verdict: &AbuseVerdict,
    ) -> Result<(), CacheError> {
        let raw =
            serde_json::to_string(verdict).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.cache.set(&Self::key(handle), &raw, Some(self.ttl)).await
    }
}

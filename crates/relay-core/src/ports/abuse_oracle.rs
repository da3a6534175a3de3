//! Abuse oracle port - the external reputation service.

use async_trait::async_trait;

use crate::domain::AbuseRule;

#[async_trait]
pub trait AbuseOracle: Send + Sync {
    /// Evaluate the oracle's rules for `handle`, forwarding the caller's IP.
    async fn fetch_rules(
        &self,
        handle: &str,
        client_ip: &str,
    ) -> Result<Vec<AbuseRule>, OracleError>;
}

/// Oracle failures. All of them leave the cached verdict untouched.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Invalid oracle URL: {0}")]
    InvalidUrl(String),

    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Oracle returned status {0}")]
    Status(u16),

    #[error("Oracle response malformed: {0}")]
    Malformed(String),
}

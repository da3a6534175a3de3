//! Domain-level error types.

use thiserror::Error;

/// Admission errors - failures that are neither a rate-limit block nor an abuse denial.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// A resolved caller is missing identity the pipeline should have provided.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Quota table errors - raised while the table is loaded at startup.
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Invalid operation name {0:?}")]
    InvalidOperation(String),

    #[error("No LCM for {owner} {app} {allowlist} on {operation}")]
    NoCapacity {
        operation: String,
        owner: u32,
        app: u32,
        allowlist: u32,
    },

    #[error("Malformed quota table: {0}")]
    Malformed(String),
}

/// Errors from parsing a serialized rate limiter key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("Expected operation:tier:signer, got {0:?}")]
    MissingField(String),

    #[error("Unknown tier {0:?}")]
    UnknownTier(String),
}

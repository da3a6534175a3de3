//! Data Transfer Objects - request/response types for the relay API.

use relay_core::domain::Tier;
use serde::{Deserialize, Serialize};

/// A mutating request whose caller has already been resolved by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub operation: String,
    pub tier: Tier,
    pub signer: String,
    #[serde(default)]
    pub user_handle: Option<String>,
    #[serde(default)]
    pub create_or_deactivate: bool,
}

/// Returned when a request passed both the rate limiter and the abuse gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub operation: String,
    pub remaining_points: u64,
    pub resets_in_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

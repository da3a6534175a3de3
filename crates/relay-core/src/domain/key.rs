//! Rate limiter keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::quota::Tier;
use crate::error::KeyParseError;

/// Separator used in the textual key form `operation:tier:signer`.
pub const KEY_SEPARATOR: char = ':';

/// Identifies one counting entry inside an operation's bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimiterKey {
    pub operation: String,
    pub tier: Tier,
    /// Opaque signer identity, e.g. a wallet or app identifier.
    pub signer: String,
}

impl RateLimiterKey {
    pub fn new(operation: impl Into<String>, tier: Tier, signer: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            tier,
            signer: signer.into(),
        }
    }

    /// Serialize as `operation:tier:signer`.
    pub fn construct(&self) -> String {
        self.to_string()
    }

    /// Parse `operation:tier:signer`.
    ///
    /// Only the first two separators split; anything after them belongs to the signer.
    pub fn deconstruct(key: &str) -> Result<Self, KeyParseError> {
        let mut parts = key.splitn(3, KEY_SEPARATOR);
        let (Some(operation), Some(tier), Some(signer)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyParseError::MissingField(key.to_string()));
        };

        Ok(Self {
            operation: operation.to_string(),
            tier: tier.parse()?,
            signer: signer.to_string(),
        })
    }
}

impl fmt::Display for RateLimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.operation,
            self.tier,
            self.signer,
            sep = KEY_SEPARATOR
        )
    }
}

impl FromStr for RateLimiterKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deconstruct(s)
    }
}

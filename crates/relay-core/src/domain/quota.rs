//! Per-operation tier quotas.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::key::KEY_SEPARATOR;
use crate::error::{KeyParseError, QuotaError};

/// Classification of the calling identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The owner of the entity being mutated.
    Owner,
    /// The official application.
    App,
    /// An allow-listed caller.
    Allowlist,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Owner, Tier::App, Tier::Allowlist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Owner => "owner",
            Tier::App => "app",
            Tier::Allowlist => "allowlist",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Tier::Owner),
            "app" => Ok(Tier::App),
            "allowlist" => Ok(Tier::Allowlist),
            other => Err(KeyParseError::UnknownTier(other.to_string())),
        }
    }
}

/// Max admitted calls per window for each tier of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationQuota {
    pub owner: u32,
    pub app: u32,
    pub allowlist: u32,
}

impl OperationQuota {
    pub const fn new(owner: u32, app: u32, allowlist: u32) -> Self {
        Self {
            owner,
            app,
            allowlist,
        }
    }

    pub fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Owner => self.owner,
            Tier::App => self.app,
            Tier::Allowlist => self.allowlist,
        }
    }

    /// Shared bucket capacity: the least common multiple of every non-zero tier quota.
    ///
    /// Zero tiers are skipped since they are always blocked. Returns `None` when
    /// every tier is zero or the multiple overflows.
    pub fn capacity(&self) -> Option<u64> {
        Tier::ALL
            .iter()
            .map(|tier| u64::from(self.for_tier(*tier)))
            .filter(|q| *q > 0)
            .try_fold(None, |acc: Option<u64>, q| match acc {
                None => Some(Some(q)),
                Some(current) => lcm(current, q).map(Some),
            })
            .flatten()
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: u64, b: u64) -> Option<u64> {
    (a / gcd(a, b)).checked_mul(b)
}

/// Operation name to quota mapping, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTable {
    quotas: BTreeMap<String, OperationQuota>,
}

impl QuotaTable {
    /// Build a table, rejecting operation names that would break key serialization.
    pub fn new(
        quotas: impl IntoIterator<Item = (String, OperationQuota)>,
    ) -> Result<Self, QuotaError> {
        let quotas: BTreeMap<_, _> = quotas.into_iter().collect();
        for operation in quotas.keys() {
            if operation.is_empty() || operation.contains(KEY_SEPARATOR) {
                return Err(QuotaError::InvalidOperation(operation.clone()));
            }
        }
        Ok(Self { quotas })
    }

    /// Parse a JSON object of `{"Operation": {"owner": n, "app": n, "allowlist": n}}`.
    pub fn from_json(json: &str) -> Result<Self, QuotaError> {
        let quotas: BTreeMap<String, OperationQuota> =
            serde_json::from_str(json).map_err(|e| QuotaError::Malformed(e.to_string()))?;
        Self::new(quotas)
    }

    /// The relay's built-in table.
    pub fn relay_defaults() -> Self {
        let quotas = RELAY_RATE_LIMITS
            .iter()
            .map(|(operation, quota)| (operation.to_string(), *quota))
            .collect();
        Self { quotas }
    }

    pub fn get(&self, operation: &str) -> Option<&OperationQuota> {
        self.quotas.get(operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperationQuota)> {
        self.quotas.iter().map(|(op, quota)| (op.as_str(), quota))
    }

    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }
}

const RELAY_RATE_LIMITS: &[(&str, OperationQuota)] = &[
    ("CreateUser", OperationQuota::new(10, 5, 1000)),
    ("UpdateUser", OperationQuota::new(100, 5, 1000)),
    ("VerifyUser", OperationQuota::new(100, 5, 1000)),
    ("UpdateUserReplicaSet", OperationQuota::new(100, 5, 1000)),
    ("CreateTrack", OperationQuota::new(100, 20, 1000)),
    ("UpdateTrack", OperationQuota::new(100, 5, 1000)),
    ("DeleteTrack", OperationQuota::new(100, 20, 1000)),
    ("CreatePlaylist", OperationQuota::new(100, 5, 1000)),
    ("UpdatePlaylist", OperationQuota::new(100, 5, 1000)),
    ("DeletePlaylist", OperationQuota::new(100, 5, 1000)),
    ("FollowUser", OperationQuota::new(2000, 10, 1000)),
    ("UnfollowUser", OperationQuota::new(2000, 10, 1000)),
    ("SubscribeUser", OperationQuota::new(2000, 10, 1000)),
    ("UnsubscribeUser", OperationQuota::new(2000, 10, 1000)),
    ("SaveTrack", OperationQuota::new(2000, 10, 1000)),
    ("UnsaveTrack", OperationQuota::new(2000, 10, 1000)),
    ("RepostTrack", OperationQuota::new(2000, 10, 1000)),
    ("UnrepostTrack", OperationQuota::new(2000, 10, 1000)),
    ("SavePlaylist", OperationQuota::new(2000, 10, 1000)),
    ("UnsavePlaylist", OperationQuota::new(2000, 10, 1000)),
    ("RepostPlaylist", OperationQuota::new(2000, 10, 1000)),
    ("UnrepostPlaylist", OperationQuota::new(2000, 10, 1000)),
    ("CreateNotification", OperationQuota::new(0, 0, 1000)),
    ("ViewNotification", OperationQuota::new(100, 0, 1000)),
    ("ViewPlaylistNotification", OperationQuota::new(100, 100, 1000)),
    ("CreateDeveloperApp", OperationQuota::new(3, 0, 1000)),
    ("DeleteDeveloperApp", OperationQuota::new(3, 0, 1000)),
    ("CreateGrant", OperationQuota::new(5, 0, 1000)),
    ("DeleteGrant", OperationQuota::new(5, 0, 1000)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_lcm_of_tiers() {
        assert_eq!(OperationQuota::new(100, 20, 1000).capacity(), Some(1000));
        assert_eq!(OperationQuota::new(10, 5, 1000).capacity(), Some(1000));
        assert_eq!(OperationQuota::new(2000, 10, 1000).capacity(), Some(2000));
        assert_eq!(OperationQuota::new(3, 7, 5).capacity(), Some(105));
    }

    #[test]
    fn test_capacity_skips_zero_tiers() {
        assert_eq!(OperationQuota::new(3, 0, 1000).capacity(), Some(3000));
        assert_eq!(OperationQuota::new(0, 0, 1000).capacity(), Some(1000));
        assert_eq!(OperationQuota::new(0, 0, 0).capacity(), None);
    }

    #[test]
    fn test_capacity_overflow_is_none() {
        let quota = OperationQuota::new(u32::MAX, u32::MAX - 1, u32::MAX - 2);
        assert_eq!(quota.capacity(), None);
    }

    #[test]
    fn test_every_default_operation_has_capacity() {
        let table = QuotaTable::relay_defaults();
        assert_eq!(table.len(), 29);
        for (operation, quota) in table.iter() {
            assert!(quota.capacity().is_some(), "{operation} has no capacity");
        }
    }

    #[test]
    fn test_rejects_separator_in_operation() {
        let err = QuotaTable::new([("Create:Track".to_string(), OperationQuota::new(1, 1, 1))])
            .unwrap_err();
        assert!(matches!(err, QuotaError::InvalidOperation(_)));
    }

    #[test]
    fn test_from_json() {
        let table = QuotaTable::from_json(
            r#"{"CreateTrack": {"owner": 100, "app": 20, "allowlist": 1000}}"#,
        )
        .unwrap();
        assert_eq!(
            table.get("CreateTrack"),
            Some(&OperationQuota::new(100, 20, 1000))
        );
        assert!(table.get("DeleteTrack").is_none());

        assert!(matches!(
            QuotaTable::from_json(r#"{"CreateTrack": {"owner": -1}}"#),
            Err(QuotaError::Malformed(_))
        ));
    }

    #[test]
    fn test_tier_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>(), Ok(tier));
        }
        assert!("admin".parse::<Tier>().is_err());
    }
}

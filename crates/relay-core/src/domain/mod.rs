//! Domain types - quotas, limiter keys and abuse verdicts.

pub mod abuse;
pub mod key;
pub mod quota;

pub use abuse::{AbuseRule, AbuseRuleSets, AbuseVerdict, RuleAction};
pub use key::{KEY_SEPARATOR, RateLimiterKey};
pub use quota::{OperationQuota, QuotaTable, Tier};

//! Anti-abuse gate backed by the external abuse oracle.

mod gate;
mod oracle;
mod verdict_cache;

pub use gate::{
    AbuseCheck, AbuseDecision, AbuseGate, AbuseGateConfig, RefreshError, parse_flag,
    parse_rule_ids,
};
pub use oracle::{FORWARDED_FOR_HEADER, HttpAbuseOracle};
pub use verdict_cache::{DEFAULT_VERDICT_TTL, VerdictCache};

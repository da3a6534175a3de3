//! Abuse rules reported by the oracle and the verdict derived from them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Pass,
    Fail,
}

/// One rule evaluation returned by the abuse oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseRule {
    pub rule: i64,
    /// Whether this rule fired for the queried user.
    pub trigger: bool,
    pub action: RuleAction,
}

impl AbuseRule {
    pub fn new(rule: i64, trigger: bool, action: RuleAction) -> Self {
        Self {
            rule,
            trigger,
            action,
        }
    }
}

/// Configured rule ids that drive each verdict flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbuseRuleSets {
    /// A triggered pass rule in this set overrides every fail rule.
    pub allow: HashSet<i64>,
    pub block_relay: HashSet<i64>,
    pub block_notifications: HashSet<i64>,
    pub block_emails: HashSet<i64>,
}

/// Cached abuse determination for a user handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseVerdict {
    pub blocked_from_relay: bool,
    pub blocked_from_notifications: bool,
    pub blocked_from_emails: bool,
    /// Triggered fail rule ids; `None` when an allow rule applied.
    pub applied_rules: Option<Vec<i64>>,
}

impl AbuseVerdict {
    /// Fully permissive verdict produced by an allow rule.
    pub fn allowed() -> Self {
        Self {
            blocked_from_relay: false,
            blocked_from_notifications: false,
            blocked_from_emails: false,
            applied_rules: None,
        }
    }

    /// Derive a verdict from the oracle's rule evaluations.
    pub fn evaluate(rules: &[AbuseRule], sets: &AbuseRuleSets) -> Self {
        if triggered(rules, RuleAction::Pass).any(|r| sets.allow.contains(&r)) {
            return Self::allowed();
        }

        let failed: Vec<i64> = triggered(rules, RuleAction::Fail).collect();
        let hits = |codes: &HashSet<i64>| failed.iter().any(|r| codes.contains(r));

        Self {
            blocked_from_relay: hits(&sets.block_relay),
            blocked_from_notifications: hits(&sets.block_notifications),
            blocked_from_emails: hits(&sets.block_emails),
            applied_rules: Some(failed),
        }
    }
}

fn triggered(rules: &[AbuseRule], action: RuleAction) -> impl Iterator<Item = i64> + '_ {
    rules
        .iter()
        .filter(move |r| r.trigger && r.action == action)
        .map(|r| r.rule)
}

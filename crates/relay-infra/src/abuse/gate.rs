//! Abuse gate: allow or deny from the cached verdict, then refresh it in the background.
//!
//! The decision never waits on the oracle. Each checked request fires a refresh
//! that runs to completion on its own task even after the request has been answered.
//! Concurrent refreshes for one handle race and the last write wins.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;

use relay_core::AdmissionError;
use relay_core::domain::{AbuseRuleSets, AbuseVerdict};
use relay_core::ports::{AbuseOracle, CacheError, OracleError};

use super::verdict_cache::VerdictCache;

/// Abuse gate configuration.
#[derive(Debug, Clone)]
pub struct AbuseGateConfig {
    /// When false every request is allowed and the oracle is never called.
    pub enabled: bool,
    pub rule_sets: AbuseRuleSets,
}

impl Default for AbuseGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rule_sets: AbuseRuleSets::default(),
        }
    }
}

impl AbuseGateConfig {
    /// Load configuration from environment variables.
    ///
    /// Rule lists are comma-separated integers; an unparseable entry is an error.
    pub fn from_env() -> Result<Self, String> {
        let rules = |var: &str| -> Result<HashSet<i64>, String> {
            std::env::var(var)
                .map(|raw| parse_rule_ids(&raw).map_err(|e| format!("{var}: {e}")))
                .unwrap_or_else(|_| Ok(HashSet::new()))
        };

        let enabled = match std::env::var("AAO_ENABLED") {
            Ok(raw) => parse_flag(&raw).map_err(|e| format!("AAO_ENABLED: {e}"))?,
            Err(_) => true,
        };

        Ok(Self {
            enabled,
            rule_sets: AbuseRuleSets {
                allow: rules("AAO_ALLOW_RULES")?,
                block_relay: rules("AAO_BLOCK_RELAY_RULES")?,
                block_notifications: rules("AAO_BLOCK_NOTIFICATIONS_RULES")?,
                block_emails: rules("AAO_BLOCK_EMAILS_RULES")?,
            },
        })
    }
}

/// Parse `"1, 2,3"` into rule ids. Empty entries are skipped.
pub fn parse_rule_ids(raw: &str) -> Result<HashSet<i64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| format!("invalid rule id {s:?}")))
        .collect()
}

/// Parse a boolean flag, case-insensitively.
pub fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("invalid flag {other:?}")),
    }
}

/// Already-resolved facts about the caller.
#[derive(Debug, Clone)]
pub struct AbuseCheck {
    pub user_handle: Option<String>,
    pub client_ip: String,
    /// The trusted official application is never checked.
    pub signer_is_app: bool,
    pub create_or_deactivate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseDecision {
    Allowed,
    Denied,
}

/// Reasons a background refresh left the cache untouched.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Failed to store verdict: {0}")]
    Cache(#[from] CacheError),
}

/// Cache-first abuse gate. Cheap to clone; clones share the oracle and the cache.
#[derive(Clone)]
pub struct AbuseGate {
    config: Arc<AbuseGateConfig>,
    oracle: Arc<dyn AbuseOracle>,
    verdicts: VerdictCache,
}

impl AbuseGate {
    pub fn new(
        config: AbuseGateConfig,
        oracle: Arc<dyn AbuseOracle>,
        verdicts: VerdictCache,
    ) -> Self {
        Self {
            config: Arc::new(config),
            oracle,
            verdicts,
        }
    }

    pub fn verdicts(&self) -> &VerdictCache {
        &self.verdicts
    }

    /// Decide from the cached verdict; unseen or expired handles are allowed.
    pub async fn decide(&self, check: &AbuseCheck) -> Result<AbuseDecision, AdmissionError> {
        if !self.config.enabled || check.signer_is_app || check.create_or_deactivate {
            return Ok(AbuseDecision::Allowed);
        }

        self.spawn_refresh(check.user_handle.clone(), check.client_ip.clone());

        let Some(handle) = check.user_handle.as_deref() else {
            return Err(AdmissionError::Internal(
                "resolved signer missing required identity".to_string(),
            ));
        };

        match self.verdicts.read(handle).await {
            Some(verdict) if verdict.blocked_from_relay => {
                tracing::info!(handle, applied_rules = ?verdict.applied_rules, "Blocked from relay");
                Ok(AbuseDecision::Denied)
            }
            _ => Ok(AbuseDecision::Allowed),
        }
    }

    /// Fire-and-forget refresh. The task owns its inputs and logs its own failures.
    pub fn spawn_refresh(&self, handle: Option<String>, client_ip: String) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            if let Err(e) = gate.refresh(handle.as_deref(), &client_ip).await {
                tracing::error!(
                    handle = ?handle,
                    error = %e,
                    "Abuse verdict refresh failed"
                );
            }
        })
    }

    /// Query the oracle and overwrite the cached verdict.
    ///
    /// Returns `Ok(None)` without calling the oracle when the gate is disabled or the
    /// handle is unknown. On error the previous verdict is left in place.
    pub async fn refresh(
        &self,
        handle: Option<&str>,
        client_ip: &str,
    ) -> Result<Option<AbuseVerdict>, RefreshError> {
        let Some(handle) = handle.filter(|_| self.config.enabled) else {
            return Ok(None);
        };

        let rules = self.oracle.fetch_rules(handle, client_ip).await?;
        let verdict = AbuseVerdict::evaluate(&rules, &self.config.rule_sets);

        tracing::info!(
            handle,
            applied_rules = ?verdict.applied_rules,
            blocked_from_relay = verdict.blocked_from_relay,
            blocked_from_notifications = verdict.blocked_from_notifications,
            blocked_from_emails = verdict.blocked_from_emails,
            "Abuse verdict refreshed"
        );

        self.verdicts.store(handle, &verdict).await?;
        Ok(Some(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use relay_core::domain::{AbuseRule, RuleAction};

    use crate::abuse::verdict_cache::DEFAULT_VERDICT_TTL;
    use crate::cache::InMemoryCache;

    const ALLOW: i64 = 1;
    const RELAY: i64 = 10;
    const EMAILS: i64 = 30;

    /// Oracle returning a swappable canned response.
    struct ScriptedOracle {
        response: Mutex<Result<Vec<AbuseRule>, u16>>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(rules: Vec<AbuseRule>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Ok(rules)),
                calls: AtomicUsize::new(0),
            })
        }

        fn respond(&self, response: Result<Vec<AbuseRule>, u16>) {
            *self.response.lock().unwrap() = response;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AbuseOracle for ScriptedOracle {
        async fn fetch_rules(&self, _: &str, _: &str) -> Result<Vec<AbuseRule>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap()
                .clone()
                .map_err(OracleError::Status)
        }
    }

    /// Oracle that never answers.
    struct StalledOracle;

    #[async_trait]
    impl AbuseOracle for StalledOracle {
        async fn fetch_rules(&self, _: &str, _: &str) -> Result<Vec<AbuseRule>, OracleError> {
            std::future::pending().await
        }
    }

    fn config() -> AbuseGateConfig {
        AbuseGateConfig {
            enabled: true,
            rule_sets: AbuseRuleSets {
                allow: HashSet::from([ALLOW]),
                block_relay: HashSet::from([RELAY]),
                block_notifications: HashSet::new(),
                block_emails: HashSet::from([EMAILS]),
            },
        }
    }

    fn gate_with(config: AbuseGateConfig, oracle: Arc<dyn AbuseOracle>) -> AbuseGate {
        let verdicts = VerdictCache::new(Arc::new(InMemoryCache::new()), DEFAULT_VERDICT_TTL);
        AbuseGate::new(config, oracle, verdicts)
    }

    fn check(handle: &str) -> AbuseCheck {
        AbuseCheck {
            user_handle: Some(handle.to_string()),
            client_ip: "198.51.100.4".to_string(),
            signer_is_app: false,
            create_or_deactivate: false,
        }
    }

    fn fail(rule: i64) -> AbuseRule {
        AbuseRule::new(rule, true, RuleAction::Fail)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_unseen_handle_is_allowed_before_oracle_answers() {
        let gate = gate_with(config(), Arc::new(StalledOracle));
        assert_eq!(gate.decide(&check("newcomer")).await.unwrap(), AbuseDecision::Allowed);
        assert_eq!(gate.verdicts().read("newcomer").await, None);
    }

    #[tokio::test]
    async fn test_decide_refreshes_in_background() {
        let oracle = ScriptedOracle::new(vec![fail(RELAY)]);
        let gate = gate_with(config(), oracle.clone());

        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Allowed);
        settle().await;
        assert_eq!(oracle.calls(), 1);

        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Denied);
        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Denied);
    }

    #[tokio::test]
    async fn test_denied_until_overwritten() {
        let oracle = ScriptedOracle::new(vec![fail(RELAY)]);
        let gate = gate_with(config(), oracle.clone());
        gate.refresh(Some("mallory"), "::1").await.unwrap();

        oracle.respond(Ok(vec![fail(EMAILS)]));
        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Denied);
        settle().await;

        let verdict = gate.verdicts().read("mallory").await.unwrap();
        assert!(!verdict.blocked_from_relay);
        assert!(verdict.blocked_from_emails);
        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_verdict_is_allowed() {
        let oracle = ScriptedOracle::new(vec![fail(RELAY)]);
        let verdicts = VerdictCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(60));
        let gate = AbuseGate::new(config(), Arc::new(StalledOracle), verdicts.clone());
        AbuseGate::new(config(), oracle, verdicts)
            .refresh(Some("mallory"), "::1")
            .await
            .unwrap();

        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Denied);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Allowed);
    }

    #[tokio::test]
    async fn test_allow_rule_overrides_everything() {
        let oracle = ScriptedOracle::new(vec![
            AbuseRule::new(ALLOW, true, RuleAction::Pass),
            fail(RELAY),
            fail(EMAILS),
        ]);
        let gate = gate_with(config(), oracle);

        let verdict = gate.refresh(Some("trusted"), "::1").await.unwrap();
        assert_eq!(verdict, Some(AbuseVerdict::allowed()));
        assert_eq!(gate.verdicts().read("trusted").await, Some(AbuseVerdict::allowed()));
    }

    #[tokio::test]
    async fn test_oracle_failure_keeps_previous_verdict() {
        let oracle = ScriptedOracle::new(vec![fail(RELAY)]);
        let gate = gate_with(config(), oracle.clone());
        let primed = gate.refresh(Some("mallory"), "::1").await.unwrap();

        oracle.respond(Err(500));
        assert!(matches!(
            gate.refresh(Some("mallory"), "::1").await,
            Err(RefreshError::Oracle(OracleError::Status(500)))
        ));
        assert_eq!(gate.verdicts().read("mallory").await, primed);

        // A failing background refresh never changes the decision either.
        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Denied);
        settle().await;
        assert_eq!(oracle.calls(), 3);
        assert_eq!(gate.verdicts().read("mallory").await, primed);
    }

    #[tokio::test]
    async fn test_exempt_callers_skip_the_oracle() {
        let oracle = ScriptedOracle::new(vec![fail(RELAY)]);
        let gate = gate_with(config(), oracle.clone());
        gate.refresh(Some("mallory"), "::1").await.unwrap();

        let app = AbuseCheck {
            signer_is_app: true,
            ..check("mallory")
        };
        let create = AbuseCheck {
            create_or_deactivate: true,
            ..check("mallory")
        };
        assert_eq!(gate.decide(&app).await.unwrap(), AbuseDecision::Allowed);
        assert_eq!(gate.decide(&create).await.unwrap(), AbuseDecision::Allowed);
        settle().await;
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_gate_allows_everyone() {
        let oracle = ScriptedOracle::new(vec![fail(RELAY)]);
        let disabled = AbuseGateConfig {
            enabled: false,
            ..config()
        };
        let gate = gate_with(disabled, oracle.clone());

        assert_eq!(gate.refresh(Some("mallory"), "::1").await.unwrap(), None);
        assert_eq!(gate.decide(&check("mallory")).await.unwrap(), AbuseDecision::Allowed);
        settle().await;
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_handle_is_internal_error() {
        let oracle = ScriptedOracle::new(vec![]);
        let gate = gate_with(config(), oracle.clone());
        let anonymous = AbuseCheck {
            user_handle: None,
            ..check("unused")
        };

        assert!(matches!(
            gate.decide(&anonymous).await,
            Err(AdmissionError::Internal(_))
        ));
        settle().await;
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn test_parse_rule_ids() {
        assert_eq!(parse_rule_ids(" 1, 2,,14 ").unwrap(), HashSet::from([1, 2, 14]));
        assert!(parse_rule_ids("").unwrap().is_empty());
        assert!(parse_rule_ids("1,x").is_err());
    }

    #[test]
    fn test_parse_flag_ignores_case() {
        assert_eq!(parse_flag("FALSE"), Ok(false));
        assert_eq!(parse_flag(" Off "), Ok(false));
        assert_eq!(parse_flag("True"), Ok(true));
        assert!(parse_flag("nope").is_err());
    }

    const RULE_VARS: [&str; 5] = [
        "AAO_ENABLED",
        "AAO_ALLOW_RULES",
        "AAO_BLOCK_RELAY_RULES",
        "AAO_BLOCK_NOTIFICATIONS_RULES",
        "AAO_BLOCK_EMAILS_RULES",
    ];

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Run `f` with exactly `vars` set among the gate's variables.
    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: every test that touches these variables holds ENV_LOCK.
        unsafe {
            for var in RULE_VARS {
                std::env::remove_var(var);
            }
            for (var, value) in vars {
                std::env::set_var(var, value);
            }
        }
        let out = f();
        unsafe {
            for var in RULE_VARS {
                std::env::remove_var(var);
            }
        }
        out
    }

    #[test]
    fn test_config_from_env() {
        let config = with_env(
            &[
                ("AAO_ENABLED", "FALSE"),
                ("AAO_ALLOW_RULES", "1"),
                ("AAO_BLOCK_RELAY_RULES", "10, 14"),
            ],
            AbuseGateConfig::from_env,
        )
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.rule_sets.allow, HashSet::from([1]));
        assert_eq!(config.rule_sets.block_relay, HashSet::from([10, 14]));
        assert!(config.rule_sets.block_emails.is_empty());

        let config = with_env(&[], AbuseGateConfig::from_env).unwrap();
        assert!(config.enabled);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = with_env(
            &[("AAO_BLOCK_EMAILS_RULES", "30,thirty")],
            AbuseGateConfig::from_env,
        )
        .unwrap_err();
        assert!(err.starts_with("AAO_BLOCK_EMAILS_RULES"), "{err}");

        let err = with_env(&[("AAO_ENABLED", "maybe")], AbuseGateConfig::from_env).unwrap_err();
        assert!(err.starts_with("AAO_ENABLED"), "{err}");
    }
}

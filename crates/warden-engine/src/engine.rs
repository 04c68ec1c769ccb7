//! The top-level decision pipeline.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use warden_core::{
    ActionEvent, AgentId, Decision, DecisionSource, PolicyMatch, Verdict,
};
use warden_policy::{ResolvedPolicy, RoleResolver, RuleOrigin};
use warden_tokens::TokenStore;

use crate::chaos::ChaosInjector;
use crate::consent::ConsentBroker;
use crate::filter::InputFilter;
use crate::ledger::SpendLedger;

/// Result of a dry-run policy evaluation (`POST /policy/test`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTestReport {
    /// The verdict the rules alone would produce.
    pub status: Verdict,
    /// The matching rule, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Where the matching rule came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DecisionSource>,
    /// The rule's audit signature (same string as `rule`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Note on the outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The decision engine: input filter → token → rules → spend → chaos → consent.
///
/// Owns no durable state; every collaborator is shared and internally
/// synchronized, so `decide` is safe to call from any number of request
/// handlers at once.
pub struct DecisionEngine {
    resolver: Arc<RoleResolver>,
    tokens: Arc<TokenStore>,
    ledger: Arc<SpendLedger>,
    filter: InputFilter,
    chaos: Arc<ChaosInjector>,
    consent: Arc<ConsentBroker>,
    default_policy: Arc<ResolvedPolicy>,
}

impl DecisionEngine {
    /// Wire up an engine over its collaborators.
    #[must_use]
    pub fn new(
        resolver: Arc<RoleResolver>,
        tokens: Arc<TokenStore>,
        ledger: Arc<SpendLedger>,
        chaos: Arc<ChaosInjector>,
        consent: Arc<ConsentBroker>,
    ) -> Self {
        Self {
            resolver,
            tokens,
            ledger,
            filter: InputFilter::new(),
            chaos,
            consent,
            default_policy: Arc::new(ResolvedPolicy::empty()),
        }
    }

    /// The consent broker, for the await/decide surface.
    #[must_use]
    pub fn consent(&self) -> &Arc<ConsentBroker> {
        &self.consent
    }

    /// The spend ledger, for the metrics surface.
    #[must_use]
    pub fn ledger(&self) -> &Arc<SpendLedger> {
        &self.ledger
    }

    /// The chaos injector, for the metrics surface.
    #[must_use]
    pub fn chaos(&self) -> &Arc<ChaosInjector> {
        &self.chaos
    }

    /// The input filter, for the test surface.
    #[must_use]
    pub fn filter(&self) -> InputFilter {
        self.filter
    }

    /// The effective policy for an agent: its resolved binding or the
    /// built-in empty (permit-by-default) policy.
    #[must_use]
    pub fn policy_for(&self, agent: &AgentId) -> Arc<ResolvedPolicy> {
        self.resolver
            .get(agent)
            .unwrap_or_else(|| Arc::clone(&self.default_policy))
    }

    /// Decide a proposed action.
    ///
    /// May rewrite the event's metadata strings with their sanitized form;
    /// the caller journals the event as mutated. On an `ask` verdict the
    /// consent ticket is parked before this returns, so the caller can
    /// immediately long-poll.
    pub async fn decide(&self, event: &mut ActionEvent) -> Decision {
        let started = Instant::now();
        let policy = self.policy_for(&event.agent);

        // Step 1: input filter.
        if let Some(level) = policy.filter {
            if let Some(report) = self.scan_metadata(event, level) {
                return finish(event, Verdict::Block, Some(PolicyMatch::input_filter()),
                    Some(format!("input filter rejected content: {report}")), started);
            }
        }

        // Step 2: token path. An authorized token short-circuits the rules
        // but not the spend check.
        let by_token = event
            .token
            .as_deref()
            .is_some_and(|t| self.tokens.authorize(t, &event.intent));

        // Step 3: policy path, block → ask → allow, permit by default.
        let (mut verdict, mut matched) = if by_token {
            (Verdict::Allow, Some(PolicyMatch::token()))
        } else {
            match policy.first_match(&event.intent, event.target.as_deref()) {
                Some((verdict, rule, origin)) => {
                    let source = match origin {
                        RuleOrigin::Template => DecisionSource::Template,
                        RuleOrigin::Override => DecisionSource::Override,
                    };
                    (verdict, Some(PolicyMatch::rule(verdict, rule.signature(), source)))
                },
                None => (Verdict::Allow, None),
            }
        };

        // Step 4: an explicit block stops here.
        if verdict == Verdict::Block {
            return finish(event, verdict, matched, Some("blocked by policy".to_string()), started);
        }

        // Step 5: spend check on the allow path.
        if verdict == Verdict::Allow {
            if let Some(info) = self.ledger.check_and_record(
                &event.agent,
                event.is_llm_intent(),
                event.cost_usd,
                policy.limits.as_ref(),
            ) {
                let message = format!(
                    "spend cap exceeded: {} {} (${:.2} of ${:.2} spent)",
                    info.category, info.timeframe, info.spent, info.value
                );
                return finish(event, Verdict::Block, Some(PolicyMatch::limit(info)),
                    Some(message), started);
            }
        }

        // Step 6: chaos. Injection flips an allow; the delay applies to any
        // verdict under an enabled config.
        if let Some(chaos_cfg) = policy.chaos.as_ref().filter(|c| c.enabled) {
            let roll = if verdict == Verdict::Allow {
                self.chaos.maybe_inject(chaos_cfg, &event.intent)
            } else {
                crate::chaos::ChaosRoll {
                    inject: false,
                    delay_ms: chaos_cfg.delay_ms.filter(|&ms| ms > 0),
                }
            };
            if let Some(delay_ms) = roll.delay_ms {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            if roll.inject {
                debug!(event = %event.id, "chaos injection");
                verdict = Verdict::Block;
                matched = Some(PolicyMatch::chaos());
                return finish(event, verdict, matched, Some("chaos injection".to_string()), started);
            }
        }

        // Step 7: park ask tickets before returning so the caller can poll.
        if verdict == Verdict::Ask {
            if let Err(e) = self.consent.park(&event.id, &event.agent, &event.intent) {
                return finish(event, Verdict::Block, Some(PolicyMatch::overload()),
                    Some(e.to_string()), started);
            }
            return finish(event, verdict, matched, Some("awaiting approval".to_string()), started);
        }

        finish(event, verdict, matched, None, started)
    }

    /// Scan the event's metadata strings. Returns `Some(summary)` when the
    /// filter rejects the content; otherwise sanitizes in place.
    fn scan_metadata(
        &self,
        event: &mut ActionEvent,
        level: warden_policy::FilterLevel,
    ) -> Option<String> {
        let metadata = event.metadata.as_mut()?;
        for value in metadata.values_mut() {
            let Value::String(text) = value else {
                continue;
            };
            let report = self.filter.scan(text, level);
            if !report.allowed {
                return Some(report.classifications.join(", "));
            }
            if report.sanitized != *text {
                *value = Value::String(report.sanitized);
            }
        }
        None
    }

    /// Dry-run the rule layer only: no journal entry, no ledger movement,
    /// no chaos, no consent ticket.
    #[must_use]
    pub fn test_policy(
        &self,
        agent: &AgentId,
        intent: &str,
        target: Option<&str>,
        inline: Option<&ResolvedPolicy>,
    ) -> PolicyTestReport {
        let bound;
        let policy = match inline {
            Some(p) => p,
            None => {
                bound = self.policy_for(agent);
                bound.as_ref()
            },
        };

        match policy.first_match(intent, target) {
            Some((status, rule, origin)) => PolicyTestReport {
                status,
                rule: Some(rule.signature().to_string()),
                source: Some(match origin {
                    RuleOrigin::Template => DecisionSource::Template,
                    RuleOrigin::Override => DecisionSource::Override,
                }),
                signature: Some(rule.signature().to_string()),
                message: None,
            },
            None => PolicyTestReport {
                status: Verdict::Allow,
                rule: None,
                source: None,
                signature: None,
                message: Some("no rule matched; allowed by default".to_string()),
            },
        }
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine").finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn finish(
    event: &ActionEvent,
    status: Verdict,
    policy: Option<PolicyMatch>,
    message: Option<String>,
    started: Instant,
) -> Decision {
    Decision {
        status,
        id: event.id.clone(),
        policy,
        message,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

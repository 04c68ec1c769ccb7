//! The resolved, flat policy the decision engine consumes.

use serde::{Deserialize, Serialize};
use std::fmt;

use warden_core::{Timestamp, Verdict};

use crate::rule::Rule;

/// Per-agent spend ceilings in USD. `ai_*` caps the `total` category,
/// `llm_*` caps `llm.*` intents only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendLimits {
    /// Daily cap across all intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_daily_usd: Option<f64>,
    /// Monthly cap across all intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_monthly_usd: Option<f64>,
    /// Daily cap for `llm.*` intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_daily_usd: Option<f64>,
    /// Monthly cap for `llm.*` intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_monthly_usd: Option<f64>,
}

impl SpendLimits {
    /// Whether no cap is configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ai_daily_usd.is_none()
            && self.ai_monthly_usd.is_none()
            && self.llm_daily_usd.is_none()
            && self.llm_monthly_usd.is_none()
    }
}

/// Synthetic-failure injection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaosConfig {
    /// Master switch.
    #[serde(default)]
    pub enabled: bool,
    /// Probability in `[0, 1]` of converting an allow into a block.
    #[serde(default)]
    pub block_rate: f64,
    /// Fixed extra latency applied to every decision under this policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Seed for a reproducible injection stream; process RNG when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Intents eligible for injection; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_intents: Vec<String>,
    /// Intents never injected, regardless of `target_intents`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exempt_intents: Vec<String>,
}

/// Strictness of the input filter pre-stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLevel {
    /// Injection detectors only.
    Permissive,
    /// Injection + PII detectors.
    Balanced,
    /// Injection + PII + sensitive-data detectors; injection findings block.
    Strict,
}

impl fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permissive => write!(f, "permissive"),
            Self::Balanced => write!(f, "balanced"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// How many leading rules in each resolved list came from the template.
///
/// The merge places template rules first, so a rule's index against these
/// counts tells whether a match should be attributed to the template or to
/// a per-agent override. Not part of the wire shape; policies deserialized
/// from a request body attribute every rule to overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateCounts {
    /// Template-sourced prefix of `allow`.
    pub allow: usize,
    /// Template-sourced prefix of `ask`.
    pub ask: usize,
    /// Template-sourced prefix of `block`.
    pub block: usize,
}

/// Where a matched rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    /// The rule was contributed by the assigned template.
    Template,
    /// The rule was contributed by a per-agent override.
    Override,
}

/// One agent's flat, effective policy.
///
/// Produced by the role resolver from a template plus overrides; the empty
/// default (permit-by-default) applies to agents with no binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPolicy {
    /// Rules that allow matching actions.
    #[serde(default)]
    pub allow: Vec<Rule>,
    /// Rules that park matching actions for consent.
    #[serde(default)]
    pub ask: Vec<Rule>,
    /// Rules that block matching actions.
    #[serde(default)]
    pub block: Vec<Rule>,
    /// Spend ceilings, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<SpendLimits>,
    /// Chaos injection settings, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos: Option<ChaosConfig>,
    /// Input-filter level, if the policy opts in to filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterLevel>,
    /// Name of the template this was resolved from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// When the resolution happened.
    pub resolved_at: Timestamp,
    /// Template-vs-override attribution for the rule lists.
    #[serde(skip)]
    pub template_counts: TemplateCounts,
}

impl ResolvedPolicy {
    /// The built-in empty policy: no rules, no limits, permit by default.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            allow: Vec::new(),
            ask: Vec::new(),
            block: Vec::new(),
            limits: None,
            chaos: None,
            filter: None,
            template: None,
            resolved_at: Timestamp::now(),
            template_counts: TemplateCounts::default(),
        }
    }

    /// Evaluate the rule sets for an intent/target pair.
    ///
    /// Precedence is `block` over `ask` over `allow`; within a set the first
    /// matching rule wins and its signature is reported. `None` means no rule
    /// matched — the caller applies the permit-by-default.
    #[must_use]
    pub fn first_match(&self, intent: &str, target: Option<&str>) -> Option<(Verdict, &Rule, RuleOrigin)> {
        for (verdict, rules, template_prefix) in [
            (Verdict::Block, &self.block, self.template_counts.block),
            (Verdict::Ask, &self.ask, self.template_counts.ask),
            (Verdict::Allow, &self.allow, self.template_counts.allow),
        ] {
            if let Some((index, rule)) = rules
                .iter()
                .enumerate()
                .find(|(_, r)| r.matches(intent, target))
            {
                let origin = if index < template_prefix {
                    RuleOrigin::Template
                } else {
                    RuleOrigin::Override
                };
                return Some((verdict, rule, origin));
            }
        }
        None
    }
}

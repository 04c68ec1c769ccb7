//! The decision shape the daemon answers with.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{EventId, Verdict};

/// Which subsystem produced the final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A rule from the agent's template matched.
    Template,
    /// A per-agent override rule matched.
    Override,
    /// A presented capability token authorized the intent.
    Token,
    /// A spend cap would have been exceeded.
    Limit,
    /// Synthetic failure injection.
    Chaos,
    /// The input filter rejected the payload.
    InputFilter,
    /// Too many outstanding ask tickets for this agent.
    Overload,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Override => write!(f, "override"),
            Self::Token => write!(f, "token"),
            Self::Limit => write!(f, "limit"),
            Self::Chaos => write!(f, "chaos"),
            Self::InputFilter => write!(f, "input_filter"),
            Self::Overload => write!(f, "overload"),
        }
    }
}

/// Spend accounting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// UTC calendar day.
    Daily,
    /// UTC calendar month.
    Monthly,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Spend accounting category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendCategory {
    /// Costs of `llm.*` intents only.
    Llm,
    /// All costs.
    Total,
}

impl fmt::Display for SpendCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Total => write!(f, "total"),
        }
    }
}

/// Details of the spend cap that produced a `limit` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitInfo {
    /// Which window was capped.
    pub timeframe: Timeframe,
    /// Which category was capped.
    pub category: SpendCategory,
    /// The configured cap in USD.
    pub value: f64,
    /// USD admitted so far in the window.
    pub spent: f64,
    /// USD remaining under the cap.
    pub remaining: f64,
}

/// The match context attached to a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMatch {
    /// The verdict this match produced.
    pub status: Verdict,
    /// Signature of the rule that matched, echoed back for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Which subsystem produced the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DecisionSource>,
    /// Set when a presented token authorized the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_token: Option<bool>,
    /// Set when a spend cap produced the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitInfo>,
    /// Set when chaos injection produced the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos: Option<bool>,
}

impl PolicyMatch {
    /// A match produced by a rule.
    #[must_use]
    pub fn rule(status: Verdict, rule: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            status,
            rule: Some(rule.into()),
            source: Some(source),
            by_token: None,
            limit: None,
            chaos: None,
        }
    }

    /// A match produced by a presented token.
    #[must_use]
    pub fn token() -> Self {
        Self {
            status: Verdict::Allow,
            rule: None,
            source: Some(DecisionSource::Token),
            by_token: Some(true),
            limit: None,
            chaos: None,
        }
    }

    /// A block produced by an exceeded spend cap.
    #[must_use]
    pub fn limit(info: LimitInfo) -> Self {
        Self {
            status: Verdict::Block,
            rule: None,
            source: Some(DecisionSource::Limit),
            by_token: None,
            limit: Some(info),
            chaos: None,
        }
    }

    /// A block produced by chaos injection.
    #[must_use]
    pub fn chaos() -> Self {
        Self {
            status: Verdict::Block,
            rule: None,
            source: Some(DecisionSource::Chaos),
            by_token: None,
            limit: None,
            chaos: Some(true),
        }
    }

    /// A block produced by the input filter.
    #[must_use]
    pub fn input_filter() -> Self {
        Self {
            status: Verdict::Block,
            rule: None,
            source: Some(DecisionSource::InputFilter),
            by_token: None,
            limit: None,
            chaos: None,
        }
    }

    /// A block produced by ask-ticket overload.
    #[must_use]
    pub fn overload() -> Self {
        Self {
            status: Verdict::Block,
            rule: None,
            source: Some(DecisionSource::Overload),
            by_token: None,
            limit: None,
            chaos: None,
        }
    }
}

/// The daemon's answer to a proposed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// The verdict.
    pub status: Verdict,
    /// Id of the event the verdict applies to.
    pub id: EventId,
    /// Match context, absent for the default allow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyMatch>,
    /// Human-readable note on the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall time spent deciding, in milliseconds.
    pub duration_ms: u64,
}

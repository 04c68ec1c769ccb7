//! Spend-limit accounting.
//!
//! Costs roll up per `(agent, category, window)` where category is `llm`
//! (intents under `llm.`) or `total` (everything), and window is the UTC
//! calendar day or month. Enforcement and recording happen under one lock
//! per agent so concurrent submissions cannot both slip past a cap.

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;

use warden_core::{AgentId, LimitInfo, SpendCategory, Timeframe};
use warden_policy::SpendLimits;

/// One accumulator window.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    spent: f64,
    window_start: DateTime<Utc>,
}

impl Bucket {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            spent: 0.0,
            window_start: now,
        }
    }

    /// Reset if `now` has rolled past the window containing `window_start`.
    fn roll(&mut self, timeframe: Timeframe, now: DateTime<Utc>) {
        let same_window = match timeframe {
            Timeframe::Daily => self.window_start.date_naive() == now.date_naive(),
            Timeframe::Monthly => {
                self.window_start.year() == now.year() && self.window_start.month() == now.month()
            },
        };
        if !same_window {
            *self = Self::fresh(now);
        }
    }
}

/// Per-agent bucket table. All four `(category, timeframe)` buckets are
/// tracked whether or not a cap is configured, so the metrics summary is
/// complete.
#[derive(Debug, Default)]
struct AgentSpend {
    buckets: HashMap<(SpendCategory, Timeframe), Bucket>,
}

impl AgentSpend {
    fn bucket(&mut self, category: SpendCategory, timeframe: Timeframe, now: DateTime<Utc>) -> &mut Bucket {
        let bucket = self
            .buckets
            .entry((category, timeframe))
            .or_insert_with(|| Bucket::fresh(now));
        bucket.roll(timeframe, now);
        bucket
    }
}

/// Spend totals for one agent, for the metrics surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpendSummary {
    /// The agent.
    pub agent: AgentId,
    /// USD admitted for `llm.*` intents today.
    pub llm_daily_usd: f64,
    /// USD admitted for `llm.*` intents this month.
    pub llm_monthly_usd: f64,
    /// USD admitted across all intents today.
    pub total_daily_usd: f64,
    /// USD admitted across all intents this month.
    pub total_monthly_usd: f64,
}

/// The spend ledger.
///
/// `check_and_record` is the only mutating path: it finds the first cap that
/// the event's cost would exceed and either blocks (no increment) or admits
/// (incrementing every relevant bucket) — atomically per agent.
#[derive(Debug, Default)]
pub struct SpendLedger {
    agents: DashMap<AgentId, AgentSpend>,
}

/// Cap checks run most-specific first; the first exceeded cap is reported.
const CAP_ORDER: &[(SpendCategory, Timeframe)] = &[
    (SpendCategory::Llm, Timeframe::Daily),
    (SpendCategory::Llm, Timeframe::Monthly),
    (SpendCategory::Total, Timeframe::Daily),
    (SpendCategory::Total, Timeframe::Monthly),
];

fn cap_for(limits: &SpendLimits, category: SpendCategory, timeframe: Timeframe) -> Option<f64> {
    match (category, timeframe) {
        (SpendCategory::Llm, Timeframe::Daily) => limits.llm_daily_usd,
        (SpendCategory::Llm, Timeframe::Monthly) => limits.llm_monthly_usd,
        (SpendCategory::Total, Timeframe::Daily) => limits.ai_daily_usd,
        (SpendCategory::Total, Timeframe::Monthly) => limits.ai_monthly_usd,
    }
}

impl SpendLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check an event's cost against the agent's caps and, if admitted,
    /// record it.
    ///
    /// Returns `None` when the event is admitted. Returns the exceeded-cap
    /// details when any configured cap would be crossed; nothing is recorded
    /// in that case. Events without a positive finite cost are admitted
    /// without touching the buckets.
    pub fn check_and_record(
        &self,
        agent: &AgentId,
        is_llm: bool,
        cost_usd: Option<f64>,
        limits: Option<&SpendLimits>,
    ) -> Option<LimitInfo> {
        let cost = match cost_usd {
            Some(c) if c > 0.0 && c.is_finite() => c,
            _ => return None,
        };

        let now = Utc::now();
        let mut entry = self.agents.entry(agent.clone()).or_default();

        if let Some(limits) = limits {
            for &(category, timeframe) in CAP_ORDER {
                if category == SpendCategory::Llm && !is_llm {
                    continue;
                }
                let Some(cap) = cap_for(limits, category, timeframe) else {
                    continue;
                };
                let bucket = entry.bucket(category, timeframe, now);
                if bucket.spent + cost > cap {
                    return Some(LimitInfo {
                        timeframe,
                        category,
                        value: cap,
                        spent: bucket.spent,
                        remaining: (cap - bucket.spent).max(0.0),
                    });
                }
            }
        }

        for &(category, timeframe) in CAP_ORDER {
            if category == SpendCategory::Llm && !is_llm {
                continue;
            }
            entry.bucket(category, timeframe, now).spent += cost;
        }
        None
    }

    /// USD admitted so far for one bucket.
    #[must_use]
    pub fn spent(&self, agent: &AgentId, category: SpendCategory, timeframe: Timeframe) -> f64 {
        let now = Utc::now();
        self.agents
            .get_mut(agent)
            .map(|mut entry| entry.bucket(category, timeframe, now).spent)
            .unwrap_or(0.0)
    }

    /// Spend totals for every agent the ledger has seen, sorted by agent.
    #[must_use]
    pub fn summary(&self) -> Vec<AgentSpendSummary> {
        let now = Utc::now();
        let mut all: Vec<AgentSpendSummary> = self
            .agents
            .iter_mut()
            .map(|mut entry| {
                let agent = entry.key().clone();
                let spend = entry.value_mut();
                AgentSpendSummary {
                    agent,
                    llm_daily_usd: spend.bucket(SpendCategory::Llm, Timeframe::Daily, now).spent,
                    llm_monthly_usd: spend
                        .bucket(SpendCategory::Llm, Timeframe::Monthly, now)
                        .spent,
                    total_daily_usd: spend
                        .bucket(SpendCategory::Total, Timeframe::Daily, now)
                        .spent,
                    total_monthly_usd: spend
                        .bucket(SpendCategory::Total, Timeframe::Monthly, now)
                        .spent,
                }
            })
            .collect();
        all.sort_by(|a, b| a.agent.as_str().cmp(b.agent.as_str()));
        all
    }
}

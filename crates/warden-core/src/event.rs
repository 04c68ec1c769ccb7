//! The action event agents submit for review.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{AgentId, EventId, MonotonicClock, Timestamp};

/// An immutable record of an action an agent proposes (or reports).
///
/// Unknown metadata fields are preserved verbatim so pass-through to the
/// journal is lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    /// Unique id, daemon-assigned when the agent omits it.
    pub id: EventId,
    /// Milliseconds since epoch; monotonically non-decreasing when
    /// daemon-assigned.
    pub ts: Timestamp,
    /// The submitting agent.
    pub agent: AgentId,
    /// Dotted action category, e.g. `slack.post`.
    pub intent: String,
    /// Free-form subject of the intent (a channel, URL, path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Structured context carried along unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Capability token presented with the action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Declared cost of the action in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// An action event as it arrives on the wire — id and timestamp optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDraft {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<EventId>,
    /// Caller-supplied timestamp; daemon clock when absent.
    #[serde(default)]
    pub ts: Option<Timestamp>,
    /// The submitting agent.
    pub agent: AgentId,
    /// Dotted action category.
    pub intent: String,
    /// Free-form subject of the intent.
    #[serde(default)]
    pub target: Option<String>,
    /// Structured context.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    /// Capability token presented with the action.
    #[serde(default)]
    pub token: Option<String>,
    /// Declared cost in USD.
    #[serde(default)]
    pub cost_usd: Option<f64>,
}

impl ActionEvent {
    /// Complete a wire draft: fill in the id and timestamp where the caller
    /// left them out.
    #[must_use]
    pub fn from_draft(draft: ActionDraft, clock: &MonotonicClock) -> Self {
        Self {
            id: draft.id.unwrap_or_else(EventId::generate),
            ts: draft.ts.unwrap_or_else(|| clock.now()),
            agent: draft.agent,
            intent: draft.intent,
            target: draft.target,
            metadata: draft.metadata,
            token: draft.token,
            cost_usd: draft.cost_usd,
        }
    }

    /// Whether this intent counts toward the `llm` spend category.
    #[must_use]
    pub fn is_llm_intent(&self) -> bool {
        self.intent.starts_with("llm.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_fills_id_and_ts() {
        let clock = MonotonicClock::new();
        let draft: ActionDraft =
            serde_json::from_str(r#"{"agent": "a", "intent": "llm.chat"}"#).unwrap();
        let event = ActionEvent::from_draft(draft, &clock);
        assert!(event.id.as_str().starts_with("evt_"));
        assert!(event.ts.millis() > 0);
    }

    #[test]
    fn test_draft_keeps_caller_id() {
        let clock = MonotonicClock::new();
        let draft: ActionDraft =
            serde_json::from_str(r#"{"id": "my-id", "agent": "a", "intent": "x.y"}"#).unwrap();
        let event = ActionEvent::from_draft(draft, &clock);
        assert_eq!(event.id.as_str(), "my-id");
    }

    #[test]
    fn test_cost_usd_camel_case() {
        let clock = MonotonicClock::new();
        let draft: ActionDraft =
            serde_json::from_str(r#"{"agent": "d", "intent": "llm.chat", "costUsd": 0.15}"#)
                .unwrap();
        let event = ActionEvent::from_draft(draft, &clock);
        assert_eq!(event.cost_usd, Some(0.15));
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("costUsd").is_some());
    }

    #[test]
    fn test_metadata_preserved_verbatim() {
        let clock = MonotonicClock::new();
        let draft: ActionDraft = serde_json::from_str(
            r#"{"agent": "a", "intent": "x.y", "metadata": {"custom": {"nested": [1, 2]}}}"#,
        )
        .unwrap();
        let event = ActionEvent::from_draft(draft, &clock);
        let round = serde_json::to_value(&event).unwrap();
        assert_eq!(round["metadata"]["custom"]["nested"][1], 2);
    }

    #[test]
    fn test_llm_intent_detection() {
        let clock = MonotonicClock::new();
        let draft: ActionDraft =
            serde_json::from_str(r#"{"agent": "a", "intent": "llm.chat"}"#).unwrap();
        assert!(ActionEvent::from_draft(draft, &clock).is_llm_intent());

        let draft: ActionDraft =
            serde_json::from_str(r#"{"agent": "a", "intent": "slack.post"}"#).unwrap();
        assert!(!ActionEvent::from_draft(draft, &clock).is_llm_intent());
    }
}

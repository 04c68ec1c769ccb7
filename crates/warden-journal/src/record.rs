//! Journal record kinds.

use serde::{Deserialize, Serialize};

use warden_core::{ActionEvent, AgentId, EventId, PolicyMatch, Timestamp, Verdict};
use warden_tokens::Token;

/// What happened to a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAction {
    /// A token was issued.
    Issued,
    /// A token was paused.
    Paused,
    /// A token was resumed.
    Resumed,
    /// A token was revoked.
    Revoked,
}

/// One timeline record, tagged by kind on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JournalRecord {
    /// An action after a non-`ask` verdict, or the `ask` itself.
    #[serde(rename_all = "camelCase")]
    Event {
        /// The (possibly sanitized) action event.
        #[serde(flatten)]
        event: ActionEvent,
        /// The verdict the engine returned.
        status: Verdict,
        /// Match context, when a subsystem produced the verdict.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        policy: Option<PolicyMatch>,
    },

    /// The human verdict bound to a parked `ask`.
    #[serde(rename_all = "camelCase")]
    Decision {
        /// Id of the asked event.
        id: EventId,
        /// When the decision landed.
        ts: Timestamp,
        /// `allow` or `block`.
        status: Verdict,
        /// Why, when recorded (e.g. `timeout`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A token lifecycle transition.
    #[serde(rename_all = "camelCase")]
    Token {
        /// When it happened.
        ts: Timestamp,
        /// What happened.
        action: TokenAction,
        /// The token after the transition.
        token: Token,
    },

    /// An agent was bound to a template.
    #[serde(rename_all = "camelCase")]
    RoleApplied {
        /// When it happened.
        ts: Timestamp,
        /// The bound agent.
        agent: AgentId,
        /// The template name, if the binding names one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
    },
}

impl JournalRecord {
    /// The record's timestamp, for range queries.
    #[must_use]
    pub fn ts(&self) -> Timestamp {
        match self {
            Self::Event { event, .. } => event.ts,
            Self::Decision { ts, .. } | Self::Token { ts, .. } | Self::RoleApplied { ts, .. } => {
                *ts
            },
        }
    }

    /// The wire tag of this record kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event { .. } => "event",
            Self::Decision { .. } => "decision",
            Self::Token { .. } => "token",
            Self::RoleApplied { .. } => "roleApplied",
        }
    }
}

/// A record with its journal-assigned cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencedRecord {
    /// Monotonic position in the journal, starting at 1.
    pub cursor: u64,
    /// The record itself, flattened onto the wire shape.
    #[serde(flatten)]
    pub record: JournalRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> ActionEvent {
        ActionEvent {
            id: EventId::new("evt_1"),
            ts: Timestamp::from_millis(1_000).unwrap(),
            agent: AgentId::new("a"),
            intent: "slack.post".to_string(),
            target: Some("#general".to_string()),
            metadata: None,
            token: None,
            cost_usd: None,
        }
    }

    #[test]
    fn test_event_record_wire_shape() {
        let record = SequencedRecord {
            cursor: 7,
            record: JournalRecord::Event {
                event: sample_event(),
                status: Verdict::Ask,
                policy: None,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["cursor"], 7);
        assert_eq!(json["id"], "evt_1");
        assert_eq!(json["status"], "ask");
        assert_eq!(json["agent"], "a");
    }

    #[test]
    fn test_role_applied_tag() {
        let record = JournalRecord::RoleApplied {
            ts: Timestamp::from_millis(1).unwrap(),
            agent: AgentId::new("a"),
            template: Some("analyst".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "roleApplied");
        assert_eq!(record.kind(), "roleApplied");
    }

    #[test]
    fn test_round_trip() {
        let record = SequencedRecord {
            cursor: 1,
            record: JournalRecord::Decision {
                id: EventId::new("evt_9"),
                ts: Timestamp::from_millis(5).unwrap(),
                status: Verdict::Block,
                reason: Some("timeout".to_string()),
            },
        };
        let text = serde_json::to_string(&record).unwrap();
        let back: SequencedRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.cursor, 1);
        assert!(matches!(
            back.record,
            JournalRecord::Decision {
                status: Verdict::Block,
                ..
            }
        ));
    }
}

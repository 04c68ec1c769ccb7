//! Identifiers, timestamps, and the verdict enum.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Opaque identifier of an agent.
///
/// Agents name themselves; the daemon never parses the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Wrap an agent id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier of an action event.
///
/// Unique for the daemon's uptime. Daemon-assigned ids use the
/// `evt_<uuid>` form; agent-supplied ids are taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Wrap an event id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh daemon-assigned event id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("evt_{}", Uuid::new_v4().simple()))
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a live fan-out subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Generate a fresh subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", &self.0.to_string()[..8])
    }
}

/// A UTC timestamp carried on the wire as milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Build from milliseconds since the Unix epoch.
    ///
    /// Returns `None` for values outside chrono's representable range.
    #[must_use]
    pub fn from_millis(ms: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(ms).single().map(Self)
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Wrap an existing `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.millis())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ms = i64::deserialize(deserializer)?;
        Self::from_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}")))
    }
}

/// Issues daemon-assigned timestamps that never move backwards.
///
/// Wall-clock regressions (NTP step, VM resume) are clamped to the last
/// issued value so journal ordering stays monotonic.
#[derive(Debug)]
pub struct MonotonicClock {
    last_ms: AtomicI64,
}

impl MonotonicClock {
    /// Create a clock starting at the current wall time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// The next timestamp: `max(wall clock, last issued)`.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        let wall = Utc::now().timestamp_millis();
        let last = self.last_ms.fetch_max(wall, Ordering::SeqCst).max(wall);
        // last is always a value previously produced by timestamp_millis
        Timestamp::from_millis(last).unwrap_or_else(Timestamp::now)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// The three verdicts the daemon can return for a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The action may proceed.
    Allow,
    /// The action is parked until a human decides.
    Ask,
    /// The action must not proceed.
    Block,
}

impl Verdict {
    /// Check if this verdict lets the action proceed.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Ask => write!(f, "ask"),
            Self::Block => write!(f, "block"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_generate_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("evt_"));
    }

    #[test]
    fn test_timestamp_millis_roundtrip() {
        let ts = Timestamp::from_millis(1_700_000_000_123).unwrap();
        assert_eq!(ts.millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_timestamp_serde_as_millis() {
        let ts = Timestamp::from_millis(42_000).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "42000");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_monotonic_clock_never_regresses() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_verdict_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Verdict::Ask).unwrap(), "\"ask\"");
        let v: Verdict = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(v, Verdict::Block);
    }

    #[test]
    fn test_agent_id_transparent_serde() {
        let id = AgentId::new("crawler-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"crawler-7\"");
    }
}

//! The token record and its lifecycle.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use warden_core::{AgentId, Timestamp, glob_match};

/// Token lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// The token authorizes its scopes.
    Active,
    /// Temporarily suspended; reversible.
    Paused,
    /// Permanently dead; terminal.
    Revoked,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// A scoped capability token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// The opaque URL-safe token string agents present.
    pub token: String,
    /// The agent the token was issued to.
    pub agent: AgentId,
    /// Intent globs this token authorizes.
    pub scopes: Vec<String>,
    /// When the token was issued.
    pub issued_at: Timestamp,
    /// When the token stops authorizing, unconditionally.
    pub expires_at: Timestamp,
    /// Lifecycle status.
    pub status: TokenStatus,
    /// Why the token exists (human-readable).
    pub reason: String,
    /// Who created the token, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Free-form customer/subscription tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Token {
    /// Whether the expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Timestamp(Utc::now()) >= self.expires_at
    }

    /// Whether the token currently authorizes anything:
    /// status active and not yet expired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active && !self.is_expired()
    }

    /// Whether the token authorizes an intent.
    ///
    /// Scope matching is intent-only: targets play no part here. An empty
    /// intent is never authorized.
    #[must_use]
    pub fn authorizes(&self, intent: &str) -> bool {
        if intent.is_empty() || !self.is_active() {
            return false;
        }
        self.scopes.iter().any(|scope| glob_match(scope, intent))
    }
}

/// Generate a fresh token string: 32 bytes from the OS CSPRNG, URL-safe
/// base64, with a recognizable prefix for log scrubbers.
#[must_use]
pub(crate) fn generate_token_string() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("wdn_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// What `introspect` reveals about a presented token string.
///
/// For unknown or expired tokens every optional field is absent — callers
/// learn nothing beyond "not active".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Introspection {
    /// Whether the token currently authorizes its scopes.
    pub active: bool,
    /// Owning agent, when the token is known and alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    /// Scopes, when the token is known and alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    /// Expiry, when the token is known and alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// Status, when the token is known and alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TokenStatus>,
}

impl Introspection {
    /// The anonymous "not active" answer.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            agent: None,
            scopes: None,
            expires_at: None,
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_token(scopes: &[&str], expires_in: Duration, status: TokenStatus) -> Token {
        Token {
            token: generate_token_string(),
            agent: AgentId::new("a"),
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            issued_at: Timestamp(Utc::now()),
            expires_at: Timestamp(Utc::now() + expires_in),
            status,
            reason: "test".to_string(),
            created_by: None,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_token_string_shape() {
        let s = generate_token_string();
        assert!(s.starts_with("wdn_"));
        // 32 bytes -> 43 base64 chars unpadded.
        assert_eq!(s.len(), 4 + 43);
        assert!(s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'));
        assert_ne!(s, generate_token_string());
    }

    #[test]
    fn test_authorizes_by_scope_glob() {
        let token = make_token(
            &["calendar.*", "email.send"],
            Duration::hours(1),
            TokenStatus::Active,
        );
        assert!(token.authorizes("calendar.read"));
        assert!(token.authorizes("calendar.write"));
        assert!(token.authorizes("email.send"));
        assert!(!token.authorizes("slack.post"));
        assert!(!token.authorizes(""));
    }

    #[test]
    fn test_expired_never_authorizes() {
        let token = make_token(&["*"], Duration::seconds(-1), TokenStatus::Active);
        assert!(token.is_expired());
        assert!(!token.is_active());
        assert!(!token.authorizes("llm.chat"));
    }

    #[test]
    fn test_paused_and_revoked_do_not_authorize() {
        let paused = make_token(&["*"], Duration::hours(1), TokenStatus::Paused);
        assert!(!paused.authorizes("llm.chat"));

        let revoked = make_token(&["*"], Duration::hours(1), TokenStatus::Revoked);
        assert!(!revoked.authorizes("llm.chat"));
    }

    #[test]
    fn test_introspection_inactive_reveals_nothing() {
        let json = serde_json::to_value(Introspection::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({"active": false}));
    }
}

//! The rule grammar and matcher.
//!
//! A rule is a string of the form `intent_glob[:target_glob]`. The first `:`
//! splits the two halves; a rule without one matches on intent alone. Both
//! halves use the anchored `*`-glob of [`warden_core::glob`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use warden_core::glob_match;

use crate::error::PolicyError;

/// A parsed rule. Keeps the original string as its audit signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    raw: String,
    intent_glob: String,
    target_glob: Option<String>,
}

/// Outcome of evaluating one rule against an intent/target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// The rule string, echoed back for audit.
    pub signature: String,
    /// Whether the rule matched.
    pub matched: bool,
}

impl Rule {
    /// Parse a rule string.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the intent half is empty
    /// (`":*"`, `""`) — such a rule could never name an action category.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PolicyError> {
        let raw = raw.into();
        let (intent_glob, target_glob) = match raw.split_once(':') {
            Some((intent, target)) => (intent.to_string(), Some(target.to_string())),
            None => (raw.clone(), None),
        };

        if intent_glob.is_empty() {
            return Err(PolicyError::InvalidRule {
                rule: raw,
                reason: "empty intent glob".to_string(),
            });
        }

        Ok(Self {
            raw,
            intent_glob,
            target_glob,
        })
    }

    /// The rule's audit signature — the original rule string.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.raw
    }

    /// Check whether this rule matches an intent/target pair.
    ///
    /// A rule without a target half ignores the target entirely. A rule with
    /// one matches an absent target against the empty string, so `intent:*`
    /// covers targetless events too. An empty intent never matches.
    #[must_use]
    pub fn matches(&self, intent: &str, target: Option<&str>) -> bool {
        if intent.is_empty() {
            return false;
        }
        if !glob_match(&self.intent_glob, intent) {
            return false;
        }
        match &self.target_glob {
            None => true,
            Some(glob) => glob_match(glob, target.unwrap_or("")),
        }
    }

    /// Evaluate the rule, producing the audit-shaped result.
    #[must_use]
    pub fn evaluate(&self, intent: &str, target: Option<&str>) -> RuleMatch {
        RuleMatch {
            signature: self.raw.clone(),
            matched: self.matches(intent, target),
        }
    }
}

impl FromStr for Rule {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Rule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

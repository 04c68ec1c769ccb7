//! Named policy templates and their YAML validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::policy::{ChaosConfig, FilterLevel, SpendLimits};
use crate::rule::Rule;

/// Top-level keys a template body may carry. Anything else is a warning.
const KNOWN_KEYS: &[&str] = &[
    "name",
    "version",
    "description",
    "allow",
    "ask",
    "block",
    "limits",
    "chaos",
    "filter",
];

fn default_version() -> u32 {
    1
}

/// A named policy body loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique template name.
    pub name: String,
    /// Positive version number, bumped by operators on edit.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Rules that allow matching actions.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Rules that park matching actions for consent.
    #[serde(default)]
    pub ask: Vec<String>,
    /// Rules that block matching actions.
    #[serde(default)]
    pub block: Vec<String>,
    /// Spend ceilings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<SpendLimits>,
    /// Chaos injection settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos: Option<ChaosConfig>,
    /// Input-filter level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterLevel>,
}

impl Template {
    /// Whether the template carries no rules and no limits.
    #[must_use]
    pub fn is_empty_body(&self) -> bool {
        self.allow.is_empty()
            && self.ask.is_empty()
            && self.block.is_empty()
            && self.limits.as_ref().is_none_or(SpendLimits::is_empty)
    }
}

/// Outcome of validating a template body.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    /// Whether the body can be used as a template.
    pub valid: bool,
    /// Fatal problems; non-empty iff `valid` is false.
    pub errors: Vec<String>,
    /// Non-fatal findings (unknown keys, duplicate rules, empty body).
    pub warnings: Vec<String>,
    /// The parsed template when `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Template>,
}

/// Validate a YAML template body.
///
/// Required: a non-empty `name`. Each rule in `allow`/`ask`/`block` must
/// parse under the rule grammar; `version` must be positive. Unknown
/// top-level keys and duplicate rules within one list are warnings, as is a
/// body with no rules and no limits.
#[must_use]
pub fn validate(yaml_text: &str) -> Validation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let value: serde_yaml::Value = match serde_yaml::from_str(yaml_text) {
        Ok(v) => v,
        Err(e) => {
            return Validation {
                valid: false,
                errors: vec![format!("yaml parse error: {e}")],
                warnings,
                parsed: None,
            };
        },
    };

    let Some(mapping) = value.as_mapping() else {
        return Validation {
            valid: false,
            errors: vec!["template body must be a mapping".to_string()],
            warnings,
            parsed: None,
        };
    };

    for key in mapping.keys() {
        match key.as_str() {
            Some(k) if KNOWN_KEYS.contains(&k) => {},
            Some(k) => warnings.push(format!("unknown key: {k}")),
            None => warnings.push("non-string key ignored".to_string()),
        }
    }

    let template: Template = match serde_yaml::from_value(value) {
        Ok(t) => t,
        Err(e) => {
            return Validation {
                valid: false,
                errors: vec![format!("template shape error: {e}")],
                warnings,
                parsed: None,
            };
        },
    };

    if template.name.trim().is_empty() {
        errors.push("template name must not be empty".to_string());
    }
    if template.version == 0 {
        errors.push("version must be a positive integer".to_string());
    }

    for (list_name, rules) in [
        ("allow", &template.allow),
        ("ask", &template.ask),
        ("block", &template.block),
    ] {
        let mut seen = HashSet::new();
        for raw in rules {
            if let Err(e) = Rule::parse(raw.clone()) {
                errors.push(format!("{list_name}: {e}"));
            }
            if !seen.insert(raw.as_str()) {
                warnings.push(format!("{list_name}: duplicate rule {raw:?}"));
            }
        }
    }

    if let Some(chaos) = &template.chaos {
        if !(0.0..=1.0).contains(&chaos.block_rate) {
            errors.push(format!(
                "chaos.block_rate must be in [0, 1], got {}",
                chaos.block_rate
            ));
        }
    }

    if errors.is_empty() && template.is_empty_body() {
        warnings.push("template has no rules and no limits".to_string());
    }

    let valid = errors.is_empty();
    Validation {
        valid,
        errors,
        warnings,
        parsed: valid.then_some(template),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r"
name: analyst
version: 2
description: read-mostly analyst agents
allow:
  - llm.chat
  - calendar.read
ask:
  - email.send:*
block:
  - exec.run
limits:
  llm_daily_usd: 5.0
";

    #[test]
    fn test_valid_template() {
        let v = validate(GOOD);
        assert!(v.valid, "errors: {:?}", v.errors);
        assert!(v.warnings.is_empty(), "warnings: {:?}", v.warnings);
        let t = v.parsed.unwrap();
        assert_eq!(t.name, "analyst");
        assert_eq!(t.version, 2);
        assert_eq!(t.ask, vec!["email.send:*"]);
        assert_eq!(t.limits.unwrap().llm_daily_usd, Some(5.0));
    }

    #[test]
    fn test_missing_name_is_error() {
        let v = validate("allow:\n  - llm.chat\n");
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("name")));
    }

    #[test]
    fn test_unknown_key_is_warning() {
        let v = validate("name: x\nallow: []\ncolour: blue\n");
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("colour")));
    }

    #[test]
    fn test_bad_rule_is_error() {
        let v = validate("name: x\nblock:\n  - ':*'\n");
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("block")));
    }

    #[test]
    fn test_duplicate_rule_is_warning() {
        let v = validate("name: x\nallow:\n  - llm.chat\n  - llm.chat\n");
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn test_zero_version_is_error() {
        let v = validate("name: x\nversion: 0\n");
        assert!(!v.valid);
    }

    #[test]
    fn test_empty_body_is_flagged_but_valid() {
        let v = validate("name: empty\n");
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("no rules")));
    }

    #[test]
    fn test_block_rate_out_of_range() {
        let v = validate("name: x\nchaos:\n  enabled: true\n  block_rate: 1.5\n");
        assert!(!v.valid);
    }

    #[test]
    fn test_malformed_yaml() {
        let v = validate("name: [unclosed");
        assert!(!v.valid);
        assert!(v.errors[0].contains("yaml"));
    }

    #[test]
    fn test_round_trip_stable() {
        let v = validate(GOOD);
        let parsed = v.parsed.unwrap();
        let serialized = serde_yaml::to_string(&parsed).unwrap();
        let v2 = validate(&serialized);
        assert!(v2.valid);
        let reparsed = v2.parsed.unwrap();
        assert_eq!(reparsed.name, parsed.name);
        assert_eq!(reparsed.version, parsed.version);
        assert_eq!(reparsed.allow, parsed.allow);
        assert_eq!(reparsed.ask, parsed.ask);
        assert_eq!(reparsed.block, parsed.block);
        assert_eq!(reparsed.limits, parsed.limits);
    }
}

//! Pattern-based input filtering: injection and PII detection.
//!
//! Three strictness levels, each a fixed set of detectors:
//!
//! - `permissive` — injection detectors only
//! - `balanced` — injection + PII (email, phone, IPv4)
//! - `strict` — injection + PII + sensitive data (SSN, Luhn-checked card
//!   numbers, health/financial/legal keywords)
//!
//! PII and sensitive matches are redacted in the sanitized output. Injection
//! findings block only at `strict`; elsewhere they surface as warnings.
//! Detectors are regular expressions compiled once, so identical input at an
//! identical level always produces identical output.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use warden_policy::FilterLevel;

/// Which family a detector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorGroup {
    /// Injection attempts: warn, or block at `strict`.
    Injection,
    /// Personally identifying information: redact.
    Pii,
    /// Sensitive identifiers (strict only): redact.
    Sensitive,
    /// Sensitive topic keywords (strict only): classify and warn, no
    /// redaction — the surrounding text still has to make sense.
    SensitiveKeyword,
}

struct Detector {
    /// Name reported in redactions.
    name: &'static str,
    /// Category used in classifications and `[REDACTED:<category>]` tags.
    category: &'static str,
    group: DetectorGroup,
    regex: Regex,
    /// Extra validation on the matched text (e.g. Luhn for card numbers).
    validate: Option<fn(&str) -> bool>,
}

#[allow(clippy::expect_used)]
fn detector(
    name: &'static str,
    category: &'static str,
    group: DetectorGroup,
    pattern: &str,
    validate: Option<fn(&str) -> bool>,
) -> Detector {
    Detector {
        name,
        category,
        group,
        // Patterns are compile-time constants; a bad one is a programming error.
        regex: Regex::new(pattern).expect("detector regex must compile"),
        validate,
    }
}

static DETECTORS: LazyLock<Vec<Detector>> = LazyLock::new(|| {
    vec![
        // -- Injection --
        detector(
            "sql_keywords",
            "sql_injection",
            DetectorGroup::Injection,
            r"(?i)(\bdrop\s+table\b|\bdelete\s+from\b|\binsert\s+into\b|\bunion\s+select\b|\bor\s+1\s*=\s*1\b|'\s*;|;\s*--)",
            None,
        ),
        detector(
            "script_tag",
            "script_tag",
            DetectorGroup::Injection,
            r"(?i)<\s*script\b",
            None,
        ),
        detector(
            "shell_metacharacters",
            "shell_injection",
            DetectorGroup::Injection,
            r"(\$\(|`|&&|\|\||;\s*(rm|curl|wget|sh|bash|nc)\b)",
            None,
        ),
        detector(
            "path_traversal",
            "path_traversal",
            DetectorGroup::Injection,
            r"\.\./|\.\.\\",
            None,
        ),
        // -- PII --
        detector(
            "email_address",
            "email",
            DetectorGroup::Pii,
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            None,
        ),
        detector(
            "phone_number",
            "phone",
            DetectorGroup::Pii,
            r"\+?\d{0,2}[\s.-]?\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b",
            None,
        ),
        detector(
            "ipv4_address",
            "ipv4",
            DetectorGroup::Pii,
            r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            None,
        ),
        // -- Sensitive --
        detector(
            "ssn_dashed",
            "ssn",
            DetectorGroup::Sensitive,
            r"\b\d{3}-\d{2}-\d{4}\b",
            None,
        ),
        detector(
            "card_number",
            "credit_card",
            DetectorGroup::Sensitive,
            r"\b\d(?:[ -]?\d){12,18}\b",
            Some(luhn_valid),
        ),
        detector(
            "sensitive_terms",
            "sensitive_keyword",
            DetectorGroup::SensitiveKeyword,
            r"(?i)\b(diagnosis|prescription|medical record|bank account|routing number|social security|password|lawsuit|subpoena)\b",
            None,
        ),
    ]
});

/// Luhn checksum over the digits of a candidate card number.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn group_enabled(group: DetectorGroup, level: FilterLevel) -> bool {
    match group {
        DetectorGroup::Injection => true,
        DetectorGroup::Pii => level != FilterLevel::Permissive,
        DetectorGroup::Sensitive | DetectorGroup::SensitiveKeyword => {
            level == FilterLevel::Strict
        },
    }
}

/// One redacted span of the scanned text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redaction {
    /// Name of the detector that fired.
    pub pattern_name: String,
    /// Byte offset into the original text.
    pub offset: usize,
    /// Byte length of the original span.
    pub length: usize,
    /// Category, as used in the `[REDACTED:<category>]` tag.
    pub category: String,
}

/// Full result of scanning one string.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Whether the text may pass. Only injection findings at `strict` flip
    /// this to false.
    pub allowed: bool,
    /// The text with every PII/sensitive span replaced.
    pub sanitized: String,
    /// Categories that triggered, sorted.
    pub classifications: Vec<String>,
    /// Redacted spans, in text order.
    pub redactions: Vec<Redaction>,
    /// Human-readable findings that did not redact (injection, keywords).
    pub warnings: Vec<String>,
}

/// The input filter. Stateless; all detectors are process-wide statics.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputFilter;

impl InputFilter {
    /// Create the filter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scan `text` at the given strictness level.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn scan(&self, text: &str, level: FilterLevel) -> ScanReport {
        let mut classifications = BTreeSet::new();
        let mut warnings = Vec::new();
        let mut injection_found = false;
        // (start, end, detector index)
        let mut spans: Vec<(usize, usize, usize)> = Vec::new();

        for (index, det) in DETECTORS.iter().enumerate() {
            if !group_enabled(det.group, level) {
                continue;
            }
            for m in det.regex.find_iter(text) {
                if det.validate.is_some_and(|check| !check(m.as_str())) {
                    continue;
                }
                classifications.insert(det.category.to_string());
                match det.group {
                    DetectorGroup::Injection => {
                        injection_found = true;
                        warnings.push(format!("{}: suspicious pattern at offset {}", det.category, m.start()));
                    },
                    DetectorGroup::SensitiveKeyword => {
                        warnings.push(format!("{}: {:?}", det.category, m.as_str()));
                    },
                    DetectorGroup::Pii | DetectorGroup::Sensitive => {
                        spans.push((m.start(), m.end(), index));
                    },
                }
            }
        }

        // Resolve overlaps: earliest start wins, longest span on ties.
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        let mut kept: Vec<(usize, usize, usize)> = Vec::new();
        for span in spans {
            if kept.last().is_none_or(|last| span.0 >= last.1) {
                kept.push(span);
            }
        }

        let mut sanitized = String::with_capacity(text.len());
        let mut cursor = 0usize;
        let mut redactions = Vec::with_capacity(kept.len());
        for (start, end, index) in kept {
            let det = &DETECTORS[index];
            sanitized.push_str(&text[cursor..start]);
            sanitized.push_str(&format!("[REDACTED:{}]", det.category));
            redactions.push(Redaction {
                pattern_name: det.name.to_string(),
                offset: start,
                length: end - start,
                category: det.category.to_string(),
            });
            cursor = end;
        }
        sanitized.push_str(&text[cursor..]);

        ScanReport {
            allowed: !(injection_found && level == FilterLevel::Strict),
            sanitized,
            classifications: classifications.into_iter().collect(),
            redactions,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, level: FilterLevel) -> ScanReport {
        InputFilter::new().scan(text, level)
    }

    // -----------------------------------------------------------------------
    // Injection
    // -----------------------------------------------------------------------

    #[test]
    fn test_sql_injection_warns_in_permissive() {
        let report = scan("'; DROP TABLE users; --", FilterLevel::Permissive);
        assert!(report.allowed);
        assert!(report.classifications.contains(&"sql_injection".to_string()));
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_sql_injection_blocks_in_strict() {
        let report = scan("'; DROP TABLE users; --", FilterLevel::Strict);
        assert!(!report.allowed);
        assert!(report.classifications.contains(&"sql_injection".to_string()));
    }

    #[test]
    fn test_script_tag_detected() {
        let report = scan("hello <script>alert(1)</script>", FilterLevel::Permissive);
        assert!(report.classifications.contains(&"script_tag".to_string()));
    }

    #[test]
    fn test_shell_metacharacters_detected() {
        let report = scan("echo $(cat /etc/passwd)", FilterLevel::Permissive);
        assert!(report
            .classifications
            .contains(&"shell_injection".to_string()));
    }

    #[test]
    fn test_path_traversal_detected() {
        let report = scan("open ../../etc/shadow", FilterLevel::Permissive);
        assert!(report
            .classifications
            .contains(&"path_traversal".to_string()));
    }

    #[test]
    fn test_clean_text_passes_everywhere() {
        for level in [
            FilterLevel::Permissive,
            FilterLevel::Balanced,
            FilterLevel::Strict,
        ] {
            let report = scan("please summarize the quarterly report", level);
            assert!(report.allowed);
            assert!(report.classifications.is_empty());
            assert!(report.redactions.is_empty());
            assert_eq!(report.sanitized, "please summarize the quarterly report");
        }
    }

    // -----------------------------------------------------------------------
    // PII
    // -----------------------------------------------------------------------

    #[test]
    fn test_email_redacted_in_balanced() {
        let report = scan("contact john@x.com today", FilterLevel::Balanced);
        assert!(report.allowed);
        assert_eq!(report.sanitized, "contact [REDACTED:email] today");
        assert_eq!(report.redactions.len(), 1);
        assert_eq!(report.redactions[0].category, "email");
        assert_eq!(report.redactions[0].offset, 8);
        assert_eq!(report.redactions[0].length, "john@x.com".len());
    }

    #[test]
    fn test_email_ignored_in_permissive() {
        let report = scan("contact john@x.com today", FilterLevel::Permissive);
        assert_eq!(report.sanitized, "contact john@x.com today");
        assert!(report.redactions.is_empty());
    }

    #[test]
    fn test_phone_and_ipv4_redacted() {
        let report = scan("call 415-555-1234 from 10.0.0.1", FilterLevel::Balanced);
        assert!(report.classifications.contains(&"phone".to_string()));
        assert!(report.classifications.contains(&"ipv4".to_string()));
        assert!(report.sanitized.contains("[REDACTED:phone]"));
        assert!(report.sanitized.contains("[REDACTED:ipv4]"));
    }

    // -----------------------------------------------------------------------
    // Sensitive (strict)
    // -----------------------------------------------------------------------

    #[test]
    fn test_ssn_redacted_in_strict_only() {
        let text = "contact john@x.com, ssn 123-45-6789";

        let strict = scan(text, FilterLevel::Strict);
        assert!(strict.allowed);
        assert_eq!(
            strict.sanitized,
            "contact [REDACTED:email], ssn [REDACTED:ssn]"
        );
        let categories: Vec<_> = strict
            .redactions
            .iter()
            .map(|r| r.category.as_str())
            .collect();
        assert_eq!(categories, vec!["email", "ssn"]);

        let balanced = scan(text, FilterLevel::Balanced);
        assert!(balanced.sanitized.contains("123-45-6789"));
    }

    #[test]
    fn test_card_number_requires_luhn() {
        // 4111111111111111 passes Luhn; 4111111111111112 does not.
        let valid = scan("card 4111 1111 1111 1111", FilterLevel::Strict);
        assert!(valid.sanitized.contains("[REDACTED:credit_card]"));

        let invalid = scan("order 4111111111111112", FilterLevel::Strict);
        assert!(invalid.sanitized.contains("4111111111111112"));
        assert!(invalid.redactions.is_empty());
    }

    #[test]
    fn test_sensitive_keyword_warns_without_redacting() {
        let report = scan("update the bank account records", FilterLevel::Strict);
        assert!(report.allowed);
        assert!(report
            .classifications
            .contains(&"sensitive_keyword".to_string()));
        assert!(report.sanitized.contains("bank account"));
        assert!(!report.warnings.is_empty());
    }

    // -----------------------------------------------------------------------
    // Determinism & structure
    // -----------------------------------------------------------------------

    #[test]
    fn test_deterministic() {
        let text = "john@x.com 10.0.0.1 '; DROP TABLE x; --";
        let a = scan(text, FilterLevel::Strict);
        let b = scan(text, FilterLevel::Strict);
        assert_eq!(a.sanitized, b.sanitized);
        assert_eq!(a.classifications, b.classifications);
        assert_eq!(a.warnings, b.warnings);
        assert_eq!(a.allowed, b.allowed);
    }

    #[test]
    fn test_classifications_sorted() {
        let report = scan("john@x.com at 10.0.0.1", FilterLevel::Balanced);
        let mut sorted = report.classifications.clone();
        sorted.sort();
        assert_eq!(report.classifications, sorted);
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5500 0000 0000 0004"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("1234"));
    }
}

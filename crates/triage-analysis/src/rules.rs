//! Keyword-rule error classifier.
//!
//! Matches the submitted text against an ordered table of rules; the first
//! rule with a matching pattern decides the type, category, root cause and
//! suggestions. Severity is decided independently by a keyword ladder.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use triage_core::types::{AnalysisSource, ErrorAnalysis, Severity};

use crate::provider::AnalysisProvider;

/// Confidence reported when a specific rule matched.
const RULE_CONFIDENCE: f64 = 0.8;
/// Confidence reported when nothing specific matched.
const GENERIC_CONFIDENCE: f64 = 0.5;

// =============================================================================
// Compiled rule tables (compiled once, reused across calls)
// =============================================================================

struct Rule {
    error_type: &'static str,
    category: &'static str,
    root_cause: &'static str,
    suggestions: &'static [&'static str],
    patterns: Vec<Regex>,
}

fn mk(pats: &[&str]) -> Vec<Regex> {
    pats.iter()
        .map(|p| Regex::new(p).expect("Invalid classification regex"))
        .collect()
}

// Order matters: more specific rules come first.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            error_type: "out_of_memory",
            category: "resource",
            root_cause: "The process exhausted its available memory",
            suggestions: &[
                "Look for unbounded caches or collections that grow with input",
                "Profile heap usage under realistic load",
                "Raise the memory limit only after ruling out a leak",
            ],
            patterns: mk(&[
                r"(?i)\bout of memory\b",
                r"(?i)\bheap (?:out of memory|limit)\b",
                r"\bOOM\b",
                r"(?i)\ballocation failed\b",
            ]),
        },
        Rule {
            error_type: "type_error",
            category: "runtime",
            root_cause: "A value was used as a type it does not have, often undefined or null",
            suggestions: &[
                "Check that the value is defined before accessing its properties",
                "Use optional chaining or explicit null checks",
                "Verify the shape of data returned by upstream calls",
            ],
            patterns: mk(&[
                r"\bTypeError\b",
                r"(?i)\bcannot read propert(?:y|ies)\b",
                r"(?i)\bis not a function\b",
                r"(?i)\bundefined is not\b",
            ]),
        },
        Rule {
            error_type: "reference_error",
            category: "runtime",
            root_cause: "Code referenced a name that is not defined in scope",
            suggestions: &[
                "Check for typos in variable and function names",
                "Make sure the symbol is imported or declared before use",
            ],
            patterns: mk(&[r"\bReferenceError\b", r"(?i)\bis not defined\b"]),
        },
        Rule {
            error_type: "syntax_error",
            category: "code",
            root_cause: "Source or input could not be parsed",
            suggestions: &[
                "Inspect the reported line for unbalanced brackets or quotes",
                "Validate JSON payloads before parsing them",
            ],
            patterns: mk(&[
                r"\bSyntaxError\b",
                r"(?i)\bunexpected token\b",
                r"(?i)\bparse error\b",
            ]),
        },
        Rule {
            error_type: "range_error",
            category: "runtime",
            root_cause: "A value fell outside its allowed range or recursion ran too deep",
            suggestions: &[
                "Check loop bounds and array indices",
                "Look for unbounded recursion",
            ],
            patterns: mk(&[
                r"\bRangeError\b",
                r"(?i)\bmaximum call stack\b",
                r"(?i)\bout of range\b",
            ]),
        },
        Rule {
            error_type: "timeout",
            category: "infrastructure",
            root_cause: "An operation did not complete within its time limit",
            suggestions: &[
                "Check the health and latency of the downstream service",
                "Add retries with backoff for idempotent calls",
                "Review the configured timeout values",
            ],
            patterns: mk(&[
                r"(?i)\btimed?[ -]?out\b",
                r"\bETIMEDOUT\b",
                r"(?i)\bdeadline exceeded\b",
            ]),
        },
        Rule {
            error_type: "network",
            category: "infrastructure",
            root_cause: "A network connection could not be established or was interrupted",
            suggestions: &[
                "Verify the target host and port are reachable",
                "Check DNS resolution and firewall rules",
                "Confirm the remote service is running",
            ],
            patterns: mk(&[
                r"\b(?:ECONNREFUSED|ECONNRESET|ENOTFOUND|EHOSTUNREACH)\b",
                r"(?i)\bnetwork\b",
                r"(?i)\bfetch failed\b",
                r"(?i)\bconnection (?:refused|reset|closed)\b",
                r"(?i)\bsocket hang up\b",
            ]),
        },
        Rule {
            error_type: "database",
            category: "data",
            root_cause: "A database operation failed",
            suggestions: &[
                "Check the query and its parameters",
                "Verify the database is reachable and migrations are applied",
                "Look for lock contention or constraint violations",
            ],
            patterns: mk(&[
                r"(?i)\b(?:database|sql|sqlite|postgres|mysql|deadlock)\b",
                r"(?i)\bduplicate key\b",
                r"(?i)\bconstraint (?:failed|violation)\b",
            ]),
        },
        Rule {
            error_type: "authentication",
            category: "security",
            root_cause: "The caller's credentials were missing, invalid or expired",
            suggestions: &[
                "Check that the token or API key is present and current",
                "Refresh expired credentials",
            ],
            patterns: mk(&[
                r"(?i)\bunauthori[sz]ed\b",
                r"(?i)\bauthentication\b",
                r"(?i)\b(?:invalid|expired) (?:token|credentials|api key)\b",
                r"\b401\b",
            ]),
        },
        Rule {
            error_type: "permission",
            category: "security",
            root_cause: "The caller is authenticated but not allowed to perform the operation",
            suggestions: &[
                "Review the role or file permissions for the caller",
                "Confirm the operation targets the intended resource",
            ],
            patterns: mk(&[
                r"(?i)\bforbidden\b",
                r"(?i)\b(?:permission|access) denied\b",
                r"\bEACCES\b",
                r"\b403\b",
            ]),
        },
        Rule {
            error_type: "not_found",
            category: "resource",
            root_cause: "A requested file, route or record does not exist",
            suggestions: &[
                "Check the path or identifier for typos",
                "Confirm the resource was created before it is requested",
            ],
            patterns: mk(&[
                r"(?i)\bnot found\b",
                r"(?i)\bno such file\b",
                r"\bENOENT\b",
                r"\b404\b",
            ]),
        },
    ]
});

struct SeverityPatterns {
    critical: Vec<Regex>,
    high: Vec<Regex>,
    medium: Vec<Regex>,
}

static SEVERITY_PATTERNS: LazyLock<SeverityPatterns> = LazyLock::new(|| SeverityPatterns {
    critical: mk(&[
        r"(?i)\bfatal\b",
        r"(?i)\bcrash(?:ed|es)?\b",
        r"(?i)\bpanic(?:ked)?\b",
        r"(?i)\bsegfault\b|\bsegmentation fault\b",
        r"(?i)\bout of memory\b",
        r"(?i)\bdata loss\b",
        r"(?i)\bcorrupt(?:ed|ion)?\b",
    ]),
    // Substring matches: "TypeError" counts as an error.
    high: mk(&[
        r"(?i)error",
        r"(?i)exception",
        r"(?i)fail",
        r"(?i)type",
        r"(?i)refused",
        r"(?i)denied",
    ]),
    medium: mk(&[
        r"(?i)warn",
        r"(?i)deprecat",
        r"(?i)time[ -]?out|timed out",
        r"(?i)retry",
        r"(?i)slow",
    ]),
});

/// Severity from the keyword ladder: critical, then high, then medium, else low.
pub fn classify_severity(text: &str) -> Severity {
    let matches_any = |patterns: &[Regex]| patterns.iter().any(|p| p.is_match(text));
    let patterns = &*SEVERITY_PATTERNS;

    if matches_any(&patterns.critical) {
        Severity::Critical
    } else if matches_any(&patterns.high) {
        Severity::High
    } else if matches_any(&patterns.medium) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Deterministic keyword-rule classifier. Never fails.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedAnalyzer;

impl RuleBasedAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify `text` synchronously.
    pub fn classify(&self, text: &str) -> ErrorAnalysis {
        let severity = classify_severity(text);

        match RULES
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| p.is_match(text)))
        {
            Some(rule) => ErrorAnalysis {
                error_type: rule.error_type.to_string(),
                category: rule.category.to_string(),
                severity,
                root_cause: rule.root_cause.to_string(),
                suggestions: rule.suggestions.iter().map(|s| s.to_string()).collect(),
                confidence: RULE_CONFIDENCE,
                source: AnalysisSource::Rules,
            },
            None => ErrorAnalysis {
                error_type: "unknown".to_string(),
                category: "general".to_string(),
                severity,
                root_cause: "No known pattern matched this message".to_string(),
                suggestions: vec![
                    "Check the full stack trace for the originating call".to_string(),
                    "Add logging around the failing operation".to_string(),
                ],
                confidence: GENERIC_CONFIDENCE,
                source: AnalysisSource::Rules,
            },
        }
    }
}

#[async_trait]
impl AnalysisProvider for RuleBasedAnalyzer {
    fn name(&self) -> &str {
        "rules"
    }

    async fn analyze(&self, text: &str) -> ErrorAnalysis {
        self.classify(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> ErrorAnalysis {
        RuleBasedAnalyzer::new().classify(text)
    }

    #[test]
    fn test_type_error_example() {
        let analysis = classify("TypeError: Cannot read property 'x' of undefined");
        assert_eq!(analysis.error_type, "type_error");
        assert_eq!(analysis.category, "runtime");
        assert_eq!(analysis.severity, Severity::High);
        assert_eq!(analysis.confidence, RULE_CONFIDENCE);
        assert_eq!(analysis.source, AnalysisSource::Rules);
        assert!(!analysis.suggestions.is_empty());
    }

    #[test]
    fn test_rule_types() {
        let cases = [
            ("ReferenceError: foo is not defined", "reference_error"),
            ("SyntaxError: Unexpected token } in JSON", "syntax_error"),
            ("RangeError: Maximum call stack size exceeded", "range_error"),
            ("Request timed out after 30s", "timeout"),
            ("connect ECONNREFUSED 127.0.0.1:5432", "network"),
            ("SQLITE_BUSY: database is locked", "database"),
            ("401 Unauthorized", "authentication"),
            ("EACCES: permission denied, open '/etc/shadow'", "permission"),
            ("ENOENT: no such file or directory", "not_found"),
            ("FATAL ERROR: JavaScript heap out of memory", "out_of_memory"),
        ];

        for (text, expected) in cases {
            assert_eq!(classify(text).error_type, expected, "text: {}", text);
        }
    }

    #[test]
    fn test_unknown_falls_back_to_generic() {
        let analysis = classify("something odd happened");
        assert_eq!(analysis.error_type, "unknown");
        assert_eq!(analysis.category, "general");
        assert_eq!(analysis.confidence, GENERIC_CONFIDENCE);
        assert_eq!(analysis.severity, Severity::Low);
    }

    #[test]
    fn test_severity_ladder() {
        assert_eq!(classify_severity("fatal: disk corrupted"), Severity::Critical);
        assert_eq!(classify_severity("thread 'main' panicked at src/main.rs"), Severity::Critical);
        assert_eq!(classify_severity("Unhandled exception in worker"), Severity::High);
        assert_eq!(classify_severity("upload failed"), Severity::High);
        assert_eq!(classify_severity("DeprecationWarning: Buffer() is deprecated"), Severity::Medium);
        assert_eq!(classify_severity("request timed out"), Severity::Medium);
        assert_eq!(classify_severity("all good"), Severity::Low);
    }

    #[test]
    fn test_critical_beats_high() {
        // Contains both "error" and "out of memory".
        assert_eq!(
            classify("FATAL ERROR: heap out of memory").severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let text = "TypeError: x is not a function";
        assert_eq!(classify(text), classify(text));
    }

    #[tokio::test]
    async fn test_provider_trait_delegates_to_classify() {
        let analyzer = RuleBasedAnalyzer::new();
        let text = "connect ECONNREFUSED";
        let via_trait = analyzer.analyze(text).await;
        assert_eq!(via_trait, analyzer.classify(text));
        assert_eq!(analyzer.name(), "rules");
    }
}

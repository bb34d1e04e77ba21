use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point in time in UTC.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// Enums
// =============================================================================

/// How serious a classified error is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Wire name, also used as the statistics key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a loosely formatted severity label (case-insensitive).
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" | "moderate" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" | "fatal" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classifier produced an [`ErrorAnalysis`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Keyword rules only.
    Rules,
    /// Language model output.
    Ai,
    /// The language model was configured but failed; keyword rules answered.
    Fallback,
}

// =============================================================================
// Records
// =============================================================================

/// Structured classification of one error message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysis {
    /// Classification label, e.g. `type_error` or `network`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Broad grouping, e.g. `runtime`, `infrastructure`.
    pub category: String,
    pub severity: Severity,
    pub root_cause: String,
    pub suggestions: Vec<String>,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub source: AnalysisSource,
}

/// Result of one completed pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    /// Submission identifier, shared by every event of the run.
    pub id: String,
    /// Submitted text, truncated for display.
    pub error_text: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub category: String,
    pub severity: Severity,
    pub root_cause: String,
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub source: AnalysisSource,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
    pub duration_ms: u64,
}

impl WorkflowRecord {
    /// Build a record from an analysis and the run's timing.
    pub fn from_analysis(
        id: impl Into<String>,
        error_text: impl Into<String>,
        analysis: ErrorAnalysis,
        started_at: Timestamp,
        completed_at: Timestamp,
    ) -> Self {
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            id: id.into(),
            error_text: error_text.into(),
            error_type: analysis.error_type,
            category: analysis.category,
            severity: analysis.severity,
            root_cause: analysis.root_cause,
            suggestions: analysis.suggestions,
            confidence: analysis.confidence,
            source: analysis.source,
            started_at,
            completed_at,
            duration_ms,
        }
    }
}

/// An error message submitted for processing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub event_id: Option<String>,
}

impl Submission {
    pub fn new(error: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            event_id: Some(event_id.into()),
        }
    }

    /// The correlation id for this submission.
    ///
    /// A missing or blank `eventId` gets a generated `evt_<uuid>` identifier.
    pub fn resolve_id(&self) -> String {
        match self.event_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("evt_{}", Uuid::new_v4().simple()),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, appending an ellipsis
/// when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> ErrorAnalysis {
        ErrorAnalysis {
            error_type: "type_error".to_string(),
            category: "runtime".to_string(),
            severity: Severity::High,
            root_cause: "Accessing a property on undefined".to_string(),
            suggestions: vec!["Add a null check".to_string()],
            confidence: 0.8,
            source: AnalysisSource::Rules,
        }
    }

    #[test]
    fn test_severity_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn test_severity_parse_is_lenient() {
        assert_eq!(Severity::parse(" HIGH "), Some(Severity::High));
        assert_eq!(Severity::parse("fatal"), Some(Severity::Critical));
        assert_eq!(Severity::parse("moderate"), Some(Severity::Medium));
        assert_eq!(Severity::parse("unknown"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_error_analysis_wire_names() {
        let json = serde_json::to_value(sample_analysis()).unwrap();
        assert_eq!(json["type"], "type_error");
        assert_eq!(json["rootCause"], "Accessing a property on undefined");
        assert_eq!(json["source"], "rules");
    }

    #[test]
    fn test_workflow_record_duration() {
        let started = Utc::now();
        let completed = started + chrono::Duration::milliseconds(1500);
        let record =
            WorkflowRecord::from_analysis("evt_1", "boom", sample_analysis(), started, completed);
        assert_eq!(record.duration_ms, 1500);
        assert_eq!(record.error_type, "type_error");
        assert_eq!(record.severity, Severity::High);
    }

    #[test]
    fn test_workflow_record_duration_never_negative() {
        let started = Utc::now();
        let completed = started - chrono::Duration::milliseconds(10);
        let record =
            WorkflowRecord::from_analysis("evt_1", "boom", sample_analysis(), started, completed);
        assert_eq!(record.duration_ms, 0);
    }

    #[test]
    fn test_submission_deserializes_camel_case() {
        let sub: Submission =
            serde_json::from_str(r#"{"error":"boom","eventId":"evt_9"}"#).unwrap();
        assert_eq!(sub.error, "boom");
        assert_eq!(sub.resolve_id(), "evt_9");
    }

    #[test]
    fn test_submission_generates_id_when_missing_or_blank() {
        let missing = Submission {
            error: "boom".to_string(),
            event_id: None,
        };
        assert!(missing.resolve_id().starts_with("evt_"));

        let blank = Submission::new("boom", "   ");
        let id = blank.resolve_id();
        assert!(id.starts_with("evt_"));
        assert!(id.len() > 4);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_chars("abcdefghijkl", 5), "abcde...");
        // Multi-byte characters are never split.
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }
}

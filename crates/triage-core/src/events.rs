use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Which pipeline stage (or connection lifecycle step) an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Validation,
    Workflow,
    MemoryUpdate,
    Completed,
    Connected,
}

impl EventKind {
    /// Suffix appended to the submission id for stage events.
    pub fn id_suffix(&self) -> &'static str {
        match self {
            EventKind::Validation => "validation",
            EventKind::Workflow => "workflow",
            EventKind::MemoryUpdate => "memory",
            EventKind::Completed => "completed",
            EventKind::Connected => "connected",
        }
    }
}

/// Progress of the stage an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl EventStatus {
    /// `Completed` and `Error` end a stage; nothing follows them for that stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Error)
    }
}

/// One state transition, as broadcast to every connected viewer.
///
/// Serialized as `{ id, type, message, timestamp, status, data? }`. Events are
/// never mutated after publication; republishing the same id produces a new,
/// independent delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub timestamp: Timestamp,
    pub status: EventStatus,
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        kind: EventKind,
        status: EventStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            status,
            payload: None,
        }
    }

    /// A pipeline stage event whose id is `<submission_id>_<stage suffix>`.
    pub fn stage(
        submission_id: &str,
        kind: EventKind,
        status: EventStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            format!("{}_{}", submission_id, kind.id_suffix()),
            kind,
            status,
            message,
        )
    }

    /// The synthetic first frame sent to a freshly opened stream connection.
    pub fn connected(connection_id: impl Into<String>) -> Self {
        Self::new(
            connection_id,
            EventKind::Connected,
            EventStatus::Completed,
            "Connected to event stream",
        )
    }

    /// Attach structured data to the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::stage(
            "evt_1",
            EventKind::MemoryUpdate,
            EventStatus::Completed,
            "Memory updated",
        )
        .with_payload(serde_json::json!({"totalErrors": 1}));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], "evt_1_memory");
        assert_eq!(json["type"], "memory_update");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["message"], "Memory updated");
        assert_eq!(json["data"]["totalErrors"], 1);
        assert!(json["timestamp"].is_string());
        assert!(json.get("kind").is_none());
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_event_without_payload_omits_data() {
        let event = Event::new("x", EventKind::Workflow, EventStatus::Processing, "Analyzing");
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_connected_event() {
        let event = Event::connected("conn-42");
        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains(r#""type":"connected""#));
        assert_eq!(event.id, "conn-42");
    }

    #[test]
    fn test_stage_ids_share_prefix() {
        let kinds = [
            EventKind::Validation,
            EventKind::Workflow,
            EventKind::MemoryUpdate,
            EventKind::Completed,
        ];
        for kind in kinds {
            let event = Event::stage("evt_7", kind, EventStatus::Processing, "");
            assert!(event.id.starts_with("evt_7_"), "{}", event.id);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(EventStatus::Completed.is_terminal());
        assert!(EventStatus::Error.is_terminal());
        assert!(!EventStatus::Pending.is_terminal());
        assert!(!EventStatus::Processing.is_terminal());
    }

    #[test]
    fn test_event_deserializes_from_wire() {
        let raw = r#"{"id":"a","type":"validation","message":"m","timestamp":"2026-01-01T00:00:00Z","status":"error"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::Validation);
        assert_eq!(event.status, EventStatus::Error);
        assert!(event.payload.is_none());
    }
}

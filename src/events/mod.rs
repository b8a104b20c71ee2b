//! Live event decoding and routing.
//!
//! The channel endpoint emits frame-delimited JSON messages matching
//! `{ id?, type, data, timestamp? }`. Frames decode into [`LiveEvent`]s with a
//! closed set of known types; anything else lands in the unknown bucket so new
//! server-side event types never break older clients.

pub mod log;
pub mod router;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::types::{HearthError, Result};

/// Closed enumeration of event types the runtime understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConfusionRaised,
    AnalyticsUpdated,
    ProgressUpdated,
    EnrollmentChanged,
    Notification,
    PaymentUpdated,
    Broadcast,
    Connected,
    /// Unrecognized type tag, kept for the event log
    Unknown(String),
}

impl EventKind {
    /// Parse a wire type tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "confusion-raised" => Self::ConfusionRaised,
            "analytics-updated" => Self::AnalyticsUpdated,
            "progress-updated" => Self::ProgressUpdated,
            "enrollment-changed" => Self::EnrollmentChanged,
            "notification" => Self::Notification,
            "payment-updated" => Self::PaymentUpdated,
            "broadcast" => Self::Broadcast,
            "connected" => Self::Connected,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire type tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConfusionRaised => "confusion-raised",
            Self::AnalyticsUpdated => "analytics-updated",
            Self::ProgressUpdated => "progress-updated",
            Self::EnrollmentChanged => "enrollment-changed",
            Self::Notification => "notification",
            Self::PaymentUpdated => "payment-updated",
            Self::Broadcast => "broadcast",
            Self::Connected => "connected",
            Self::Unknown(tag) => tag,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded push message from the live channel.
#[derive(Debug, Clone)]
pub struct LiveEvent {
    /// Server-assigned id when present, locally generated otherwise
    pub id: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub server_timestamp: Option<DateTime<Utc>>,
}

/// Wire envelope for a single channel frame.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
    timestamp: Option<DateTime<Utc>>,
}

impl LiveEvent {
    /// Create an event with a generated id. Useful for locally-sourced events
    /// and tests; channel frames go through [`LiveEvent::from_wire`].
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            server_timestamp: None,
        }
    }

    /// Override the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Decode a single frame from the channel.
    pub fn from_wire(raw: &str) -> Result<Self> {
        let envelope: WireEnvelope = serde_json::from_str(raw)
            .map_err(|e| HearthError::Protocol(format!("Malformed channel message: {e}")))?;

        Ok(Self {
            id: envelope
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            kind: EventKind::parse(&envelope.kind),
            payload: envelope.data,
            server_timestamp: envelope.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for tag in [
            "confusion-raised",
            "analytics-updated",
            "progress-updated",
            "enrollment-changed",
            "notification",
            "payment-updated",
            "broadcast",
            "connected",
        ] {
            assert_eq!(EventKind::parse(tag).as_str(), tag);
        }
    }

    #[test]
    fn test_unknown_kind_preserved() {
        let kind = EventKind::parse("telemetry-v2");
        assert_eq!(kind, EventKind::Unknown("telemetry-v2".to_string()));
        assert_eq!(kind.as_str(), "telemetry-v2");
    }

    #[test]
    fn test_from_wire() {
        let raw = r#"{"id":"ev-1","type":"progress-updated","data":{"student_id":"s1","percent_complete":42.0},"timestamp":"2026-01-15T10:00:00Z"}"#;
        let event = LiveEvent::from_wire(raw).unwrap();
        assert_eq!(event.id, "ev-1");
        assert_eq!(event.kind, EventKind::ProgressUpdated);
        assert_eq!(event.payload["student_id"], "s1");
        assert!(event.server_timestamp.is_some());
    }

    #[test]
    fn test_from_wire_generates_missing_id() {
        let raw = r#"{"type":"broadcast","data":{"message":"hello"}}"#;
        let event = LiveEvent::from_wire(raw).unwrap();
        assert!(!event.id.is_empty());
    }

    #[test]
    fn test_from_wire_rejects_malformed() {
        assert!(LiveEvent::from_wire("not json").is_err());
        assert!(LiveEvent::from_wire(r#"{"data":{}}"#).is_err());
    }
}

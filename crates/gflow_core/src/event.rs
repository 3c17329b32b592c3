//! Client-facing stream events and their wire framing.
//!
//! Every event leaves the process as a single text frame:
//!
//! ```text
//! data: {"type":"progress","content":"GRADING PURPOSE AND OBJECTIVES ...","step":2,"total":4}
//!
//! ```
//!
//! Internally events travel as typed [`StreamEvent`] values; the JSON form is
//! produced only at the boundary by [`StreamEvent::to_frame`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of every wire frame.
pub const FRAME_PREFIX: &str = "data: ";

/// Event kinds as they appear in the `type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Status,
    Progress,
    Section,
    Content,
    Error,
    Complete,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Content,
        EventKind::Status,
        EventKind::Progress,
        EventKind::Section,
        EventKind::Error,
        EventKind::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Progress => "progress",
            Self::Section => "section",
            Self::Content => "content",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }
}

/// A single event on the evaluation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Informational status line, optionally with structured metadata.
    Status {
        text: String,
        metadata: Option<Value>,
    },
    /// Stage progress; `step` is 1-based.
    Progress {
        text: String,
        step: usize,
        total: usize,
    },
    /// Section heading for the stage that follows.
    Section(String),
    /// A display-ready chunk of model output.
    Content(String),
    /// Fatal pipeline failure. Always followed by `Complete`.
    Error(String),
    /// End of stream on the success and failure paths.
    Complete,
}

impl StreamEvent {
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn status_with_metadata(text: impl Into<String>, metadata: Value) -> Self {
        Self::Status {
            text: text.into(),
            metadata: Some(metadata),
        }
    }

    pub fn progress(text: impl Into<String>, step: usize, total: usize) -> Self {
        Self::Progress {
            text: text.into(),
            step,
            total,
        }
    }

    pub fn section(title: impl Into<String>) -> Self {
        Self::Section(title.into())
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Status { .. } => EventKind::Status,
            Self::Progress { .. } => EventKind::Progress,
            Self::Section(_) => EventKind::Section,
            Self::Content(_) => EventKind::Content,
            Self::Error(_) => EventKind::Error,
            Self::Complete => EventKind::Complete,
        }
    }

    /// True only for `Complete`, the last event of any stream that was not cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Text carried by the event (empty for `Complete`).
    pub fn text(&self) -> &str {
        match self {
            Self::Status { text, .. } | Self::Progress { text, .. } => text,
            Self::Section(text) | Self::Content(text) | Self::Error(text) => text,
            Self::Complete => "",
        }
    }

    /// Serialize to the JSON object used on the wire.
    pub fn to_json(&self) -> String {
        let wire = WireEvent::from(self);
        match serde_json::to_string(&wire) {
            Ok(json) => json,
            // Strings and JSON values always serialize; keep the frame well-formed regardless.
            Err(_) => format!(r#"{{"type":"{}","content":""}}"#, wire.kind.as_str()),
        }
    }

    /// Serialize to a complete `data: <json>\n\n` frame.
    pub fn to_frame(&self) -> String {
        format!("{}{}\n\n", FRAME_PREFIX, self.to_json())
    }

    /// Parse a single frame (or a bare `data:` line) back into an event.
    ///
    /// Returns `None` for anything that is not a well-formed event frame.
    pub fn parse_frame(frame: &str) -> Option<Self> {
        let payload = frame.trim().strip_prefix("data:")?.trim_start();
        let wire: WireEvent = serde_json::from_str(payload).ok()?;
        Some(wire.into())
    }
}

/// JSON shape of an event on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<&StreamEvent> for WireEvent {
    fn from(event: &StreamEvent) -> Self {
        let mut wire = WireEvent {
            kind: event.kind(),
            content: event.text().to_string(),
            step: None,
            total: None,
            metadata: None,
        };
        match event {
            StreamEvent::Progress { step, total, .. } => {
                wire.step = Some(*step);
                wire.total = Some(*total);
            }
            StreamEvent::Status { metadata, .. } => {
                wire.metadata = metadata.clone();
            }
            _ => {}
        }
        wire
    }
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        match wire.kind {
            EventKind::Status => StreamEvent::Status {
                text: wire.content,
                metadata: wire.metadata,
            },
            EventKind::Progress => StreamEvent::Progress {
                text: wire.content,
                step: wire.step.unwrap_or(0),
                total: wire.total.unwrap_or(0),
            },
            EventKind::Section => StreamEvent::Section(wire.content),
            EventKind::Content => StreamEvent::Content(wire.content),
            EventKind::Error => StreamEvent::Error(wire.content),
            EventKind::Complete => StreamEvent::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_frame_carries_step_and_total() {
        let frame = StreamEvent::progress("Formatting ...", 2, 4).to_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));

        let value: Value = serde_json::from_str(frame[6..].trim()).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["content"], "Formatting ...");
        assert_eq!(value["step"], 2);
        assert_eq!(value["total"], 4);
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_complete_frame_has_empty_content() {
        let json = StreamEvent::Complete.to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["content"], "");
        assert!(value.get("step").is_none());
    }

    #[test]
    fn test_status_metadata_is_serialized() {
        let event = StreamEvent::status_with_metadata("Starting analysis...", json!({"provider": "openai"}));
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["metadata"]["provider"], "openai");
    }

    #[test]
    fn test_parse_frame() {
        let event = StreamEvent::section("GRADING RESULTS AND PRODUCT");
        assert_eq!(StreamEvent::parse_frame(&event.to_frame()), Some(event));
        assert_eq!(StreamEvent::parse_frame("data: not json"), None);
        assert_eq!(StreamEvent::parse_frame(": heartbeat"), None);
    }

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(StreamEvent::Complete.is_terminal());
        assert!(!StreamEvent::error("boom").is_terminal());
        assert_eq!(StreamEvent::error("boom").kind(), EventKind::Error);
    }
}

//! Event types for run transcripts
//!
//! A run's transcript is an ordered list of [`RunEvent`]s. The same record is
//! used on the wire, in buffered responses and in the session store:
//!
//! ```json
//! {"kind": "content-delta", "run_id": "...", "session_id": "...", "seq": 1, "content": "Hi"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolCall;

/// One observable step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub session_id: String,
    /// 1-based position within the run's transcript
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Kind-specific payload of a [`RunEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventKind {
    /// Incremental output text
    ContentDelta { content: String },
    /// The entity wants to invoke a tool
    ToolCallProposed {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: Value,
        /// Set when the call must be resolved by the caller before the run continues
        #[serde(default)]
        requires_resolution: bool,
    },
    /// Outcome of a tool invocation
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// The run is suspended until every pending call is resolved
    Paused { pending: Vec<ToolCall> },
    Completed {},
    Error { message: String },
}

impl EventKind {
    pub fn content_delta(content: impl Into<String>) -> Self {
        Self::ContentDelta {
            content: content.into(),
        }
    }

    pub fn tool_call_proposed(call: &ToolCall, requires_resolution: bool) -> Self {
        Self::ToolCallProposed {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            requires_resolution,
        }
    }

    pub fn tool_result(call: &ToolCall, result: Value, is_error: bool) -> Self {
        Self::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
            is_error,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContentDelta { .. } => "content-delta",
            Self::ToolCallProposed { .. } => "tool-call-proposed",
            Self::ToolResult { .. } => "tool-result",
            Self::Paused { .. } => "paused",
            Self::Completed {} => "completed",
            Self::Error { .. } => "error",
        }
    }

    /// Paused, completed and error end the current segment of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paused { .. } | Self::Completed {} | Self::Error { .. }
        )
    }

    pub fn is_tool_boundary(&self) -> bool {
        matches!(self, Self::ToolCallProposed { .. } | Self::ToolResult { .. })
    }
}

impl RunEvent {
    pub fn new(
        run_id: impl Into<String>,
        session_id: impl Into<String>,
        seq: u64,
        kind: EventKind,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            seq,
            created_at: Utc::now(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_record_shape() {
        let event = RunEvent::new("r1", "s1", 1, EventKind::content_delta("Hi"));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "content-delta");
        assert_eq!(value["run_id"], "r1");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["content"], "Hi");
    }

    #[test]
    fn test_decode_stored_record() {
        let raw = json!({
            "kind": "tool-call-proposed",
            "run_id": "r1",
            "session_id": "s1",
            "seq": 2,
            "created_at": "2024-01-01T00:00:00Z",
            "tool_call_id": "t1",
            "tool_name": "search",
            "arguments": {"q": "haiku"},
            "requires_resolution": true
        });
        let event: RunEvent = serde_json::from_value(raw).unwrap();

        assert_eq!(event.seq, 2);
        match &event.kind {
            EventKind::ToolCallProposed {
                tool_call_id,
                requires_resolution,
                ..
            } => {
                assert_eq!(tool_call_id, "t1");
                assert!(requires_resolution);
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: RunEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_completed_has_no_payload() {
        let event = RunEvent::new("r1", "s1", 3, EventKind::Completed {});
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "completed");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(EventKind::error("boom").is_terminal());
        assert!(EventKind::Paused { pending: vec![] }.is_terminal());
        assert!(!EventKind::content_delta("x").is_terminal());
        assert_eq!(EventKind::error("boom").name(), "error");
    }
}

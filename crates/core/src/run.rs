//! Run model and its lifecycle
//!
//! ```text
//! created -> running -> completed | errored | paused
//! paused  -> running            (resume with a full set of resolutions)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::event::{EventKind, RunEvent};
use crate::kind::EntityKind;
use crate::tool::{validate_resolutions, PendingToolCall, ToolResolution};
use crate::{Error, Result};

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Paused,
    Completed,
    Errored,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Errored)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

/// One execution of an entity against an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub session_id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Parent team session for member sub-runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_session_id: Option<String>,
    pub input: Value,
    pub status: RunStatus,
    #[serde(default)]
    pub events: Vec<RunEvent>,
    #[serde(default)]
    pub pending_tool_calls: Vec<PendingToolCall>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl Run {
    pub fn new(
        session_id: impl Into<String>,
        entity_id: impl Into<String>,
        entity_kind: EntityKind,
        input: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            entity_id: entity_id.into(),
            entity_kind,
            user_id: None,
            team_session_id: None,
            input,
            status: RunStatus::Created,
            events: Vec::new(),
            pending_tool_calls: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_team_session(mut self, team_session_id: impl Into<String>) -> Self {
        self.team_session_id = Some(team_session_id.into());
        self
    }

    /// Move to `next`, rejecting anything outside the lifecycle graph.
    pub fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let now = Utc::now();
        if next == RunStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.ended_at = Some(now);
            self.calculate_duration();
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Append an event to the transcript and apply its effect on the status.
    ///
    /// Only a running run accepts events. Earlier events are never touched.
    pub fn record(&mut self, kind: EventKind) -> Result<RunEvent> {
        if self.status != RunStatus::Running {
            return Err(Error::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: kind.name().to_string(),
            });
        }

        match &kind {
            EventKind::Paused { pending } => {
                if pending.is_empty() {
                    return Err(Error::InvalidInput(
                        "A paused event must carry at least one pending tool call".into(),
                    ));
                }
                self.transition(RunStatus::Paused)?;
                self.pending_tool_calls = pending
                    .iter()
                    .cloned()
                    .map(PendingToolCall::new)
                    .collect();
            }
            EventKind::Completed {} => self.transition(RunStatus::Completed)?,
            EventKind::Error { message } => {
                self.transition(RunStatus::Errored)?;
                self.error = Some(message.clone());
            }
            _ => self.updated_at = Utc::now(),
        }

        let event = RunEvent::new(
            self.run_id.clone(),
            self.session_id.clone(),
            self.next_seq(),
            kind,
        );
        self.events.push(event.clone());
        Ok(event)
    }

    /// Apply resolutions to a paused run.
    ///
    /// On success the pending set is consumed, the resolved calls are
    /// returned in proposal order and the run is running again. On failure
    /// the run is left exactly as it was.
    pub fn resolve(&mut self, resolutions: &[ToolResolution]) -> Result<Vec<PendingToolCall>> {
        if self.status != RunStatus::Paused {
            return Err(Error::InvalidResume(format!(
                "Run {} is {}, not paused",
                self.run_id,
                self.status.as_str()
            )));
        }
        validate_resolutions(&self.pending_tool_calls, resolutions)?;

        let mut resolved = std::mem::take(&mut self.pending_tool_calls);
        for call in resolved.iter_mut() {
            if let Some(resolution) = resolutions
                .iter()
                .find(|r| r.tool_call_id == call.tool_call.id)
            {
                call.resolve(resolution.clone());
            }
        }
        self.transition(RunStatus::Running)?;
        Ok(resolved)
    }

    /// Concatenated content deltas
    pub fn content(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::ContentDelta { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The user-facing message of the input: a plain string or a `message` field.
    pub fn input_text(&self) -> Option<String> {
        input_text(&self.input)
    }

    pub fn last_event(&self) -> Option<&RunEvent> {
        self.events.last()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn next_seq(&self) -> u64 {
        self.events.last().map(|e| e.seq + 1).unwrap_or(1)
    }

    fn calculate_duration(&mut self) {
        if let (Some(started), Some(ended)) = (self.started_at, self.ended_at) {
            let duration = ended.signed_duration_since(started);
            self.duration_ms = Some(duration.num_milliseconds().max(0) as u64);
        }
    }
}

/// Extract the user message from a run input value.
pub fn input_text(input: &Value) -> Option<String> {
    match input {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Summary of a run for listing purposes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub session_id: String,
    pub entity_id: String,
    pub input_preview: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub event_count: usize,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        let text = run.input_text().unwrap_or_else(|| run.input.to_string());
        let input_preview = if text.chars().count() > 100 {
            format!("{}...", text.chars().take(100).collect::<String>())
        } else {
            text
        };

        Self {
            run_id: run.run_id.clone(),
            session_id: run.session_id.clone(),
            entity_id: run.entity_id.clone(),
            input_preview,
            status: run.status,
            created_at: run.created_at,
            duration_ms: run.duration_ms,
            event_count: run.events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolCall;
    use serde_json::json;

    fn running_run() -> Run {
        let mut run = Run::new("s1", "writer", EntityKind::Agent, json!("draft a haiku"));
        run.transition(RunStatus::Running).unwrap();
        run
    }

    #[test]
    fn test_lifecycle_graph() {
        use RunStatus::*;
        assert!(Created.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Errored.can_transition_to(Running));
        assert!(!Created.can_transition_to(Completed));
    }

    #[test]
    fn test_record_assigns_increasing_seq() {
        let mut run = running_run();
        let first = run.record(EventKind::content_delta("An old pond")).unwrap();
        let second = run.record(EventKind::content_delta(", a frog")).unwrap();
        let done = run.record(EventKind::Completed {}).unwrap();

        assert_eq!((first.seq, second.seq, done.seq), (1, 2, 3));
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.content(), "An old pond, a frog");
        assert!(run.ended_at.is_some());
        assert!(run.duration_ms.is_some());
    }

    #[test]
    fn test_no_events_after_terminal() {
        let mut run = running_run();
        run.record(EventKind::error("model unavailable")).unwrap();
        assert_eq!(run.status, RunStatus::Errored);
        assert_eq!(run.error.as_deref(), Some("model unavailable"));
        assert!(run.record(EventKind::content_delta("late")).is_err());
        assert_eq!(run.events.len(), 1);
    }

    #[test]
    fn test_pause_and_resolve() {
        let mut run = running_run();
        let call = ToolCall::new("t1", "search", json!({"q": "frogs"}));
        run.record(EventKind::tool_call_proposed(&call, true)).unwrap();
        run.record(EventKind::Paused {
            pending: vec![call.clone()],
        })
        .unwrap();
        assert_eq!(run.status, RunStatus::Paused);
        assert_eq!(run.pending_tool_calls.len(), 1);

        // A partial resume leaves the run untouched
        let before = run.clone();
        assert!(run.resolve(&[]).is_err());
        assert_eq!(run, before);

        let resolved = run
            .resolve(&[ToolResolution::with_result("t1", json!(["result"]))])
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].state, crate::tool::ResolutionState::Resolved);
        assert!(run.pending_tool_calls.is_empty());
        assert_eq!(run.status, RunStatus::Running);

        let next = run.record(EventKind::content_delta("done")).unwrap();
        assert_eq!(next.seq, 4);
    }

    #[test]
    fn test_pause_requires_pending_calls() {
        let mut run = running_run();
        assert!(run.record(EventKind::Paused { pending: vec![] }).is_err());
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn test_input_text() {
        assert_eq!(input_text(&json!("hi")).as_deref(), Some("hi"));
        assert_eq!(input_text(&json!({"message": "hey"})).as_deref(), Some("hey"));
        assert_eq!(input_text(&json!(42)), None);
    }

    #[test]
    fn test_summary_preview_truncates() {
        let run = Run::new("s1", "writer", EntityKind::Agent, json!("x".repeat(150)));
        let summary = RunSummary::from(&run);
        assert_eq!(summary.input_preview.len(), 103);
        assert_eq!(summary.status, RunStatus::Created);
    }
}

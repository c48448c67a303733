//! Sessions group the runs of one entity for one conversation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kind::EntityKind;
use crate::run::{Run, RunStatus};

/// Free-form session metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A conversation thread and the runs recorded in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        entity_id: impl Into<String>,
        entity_kind: EntityKind,
        user_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            entity_id: entity_id.into(),
            entity_kind,
            user_id,
            runs: Vec::new(),
            metadata: SessionMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Session owning a run that is being stored for the first time.
    pub fn for_run(session_id: impl Into<String>, run: &Run) -> Self {
        Self::new(
            session_id,
            run.entity_id.clone(),
            run.entity_kind,
            run.user_id.clone(),
        )
    }

    /// Store `run`, replacing the earlier copy of the same run if present.
    pub fn upsert_run(&mut self, run: Run) {
        match self.runs.iter_mut().find(|r| r.run_id == run.run_id) {
            Some(existing) => *existing = run,
            None => self.runs.push(run),
        }
        self.updated_at = Utc::now();
    }

    pub fn find_run(&self, run_id: &str) -> Option<&Run> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }

    /// Runs that belong to this session itself; team member sub-runs
    /// carry their own session id and are left out.
    pub fn display_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs
            .iter()
            .filter(move |r| r.session_id == self.session_id)
    }

    /// The most recent `limit` completed runs, oldest first.
    pub fn history(&self, limit: usize) -> Vec<Run> {
        let completed: Vec<&Run> = self
            .display_runs()
            .filter(|r| r.status == RunStatus::Completed)
            .collect();
        let skip = completed.len().saturating_sub(limit);
        completed.into_iter().skip(skip).cloned().collect()
    }

    /// First user message of the session
    pub fn title(&self) -> Option<String> {
        self.display_runs().find_map(Run::input_text)
    }

    pub fn belongs_to(&self, entity_id: &str) -> bool {
        self.entity_id == entity_id
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from(self)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id.clone(),
            entity_id: self.entity_id.clone(),
            entity_kind: self.entity_kind,
            user_id: self.user_id.clone(),
            session_name: self.metadata.session_name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            runs: self
                .display_runs()
                .map(|run| RunView {
                    message: run.input_text(),
                    run: run.clone(),
                })
                .collect(),
        }
    }
}

/// Listing entry for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub entity_id: String,
    pub title: Option<String>,
    pub session_name: Option<String>,
    pub run_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            entity_id: session.entity_id.clone(),
            title: session.title(),
            session_name: session.metadata.session_name.clone(),
            run_count: session.display_runs().count(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Display form of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub user_id: Option<String>,
    pub session_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub runs: Vec<RunView>,
}

/// A run paired with the user message that started it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunView {
    pub message: Option<String>,
    pub run: Run,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use serde_json::json;

    fn completed_run(session_id: &str, entity_id: &str, message: &str) -> Run {
        let mut run = Run::new(session_id, entity_id, EntityKind::Agent, json!(message));
        run.transition(RunStatus::Running).unwrap();
        run.record(EventKind::content_delta("ok")).unwrap();
        run.record(EventKind::Completed {}).unwrap();
        run
    }

    #[test]
    fn test_upsert_replaces_same_run() {
        let mut session = Session::new("s1", "writer", EntityKind::Agent, None);
        let mut run = Run::new("s1", "writer", EntityKind::Agent, json!("hi"));
        session.upsert_run(run.clone());
        run.transition(RunStatus::Running).unwrap();
        session.upsert_run(run.clone());
        session.upsert_run(completed_run("s1", "writer", "again"));

        assert_eq!(session.runs.len(), 2);
        assert_eq!(session.runs[0].status, RunStatus::Running);
    }

    #[test]
    fn test_team_view_excludes_member_runs() {
        let mut session = Session::new("team-s", "research-team", EntityKind::Team, None);
        session.upsert_run(completed_run("team-s", "research-team", "find papers"));
        session.upsert_run(
            completed_run("team-s/searcher", "searcher", "search arxiv")
                .with_team_session("team-s"),
        );

        let view = session.view();
        assert_eq!(session.runs.len(), 2);
        assert_eq!(view.runs.len(), 1);
        assert_eq!(view.runs[0].message.as_deref(), Some("find papers"));
        assert_eq!(session.summary().run_count, 1);
    }

    #[test]
    fn test_history_keeps_latest_completed() {
        let mut session = Session::new("s1", "writer", EntityKind::Agent, None);
        for msg in ["one", "two", "three"] {
            session.upsert_run(completed_run("s1", "writer", msg));
        }
        let mut paused = Run::new("s1", "writer", EntityKind::Agent, json!("four"));
        paused.transition(RunStatus::Running).unwrap();
        session.upsert_run(paused);

        let history = session.history(2);
        let inputs: Vec<_> = history.iter().filter_map(Run::input_text).collect();
        assert_eq!(inputs, vec!["two", "three"]);
    }

    #[test]
    fn test_title_and_name() {
        let mut session = Session::new("s1", "writer", EntityKind::Agent, None);
        assert_eq!(session.title(), None);
        session.upsert_run(completed_run("s1", "writer", "draft a haiku"));
        session.metadata.session_name = Some("Poems".into());

        let summary = session.summary();
        assert_eq!(summary.title.as_deref(), Some("draft a haiku"));
        assert_eq!(summary.session_name.as_deref(), Some("Poems"));
    }
}

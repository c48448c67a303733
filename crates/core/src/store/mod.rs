//! Session store contract
//!
//! Stores persist sessions and their runs. Appends to one session are
//! serialized by the store so concurrent writers never lose each other's runs.

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::run::Run;
use crate::session::{Session, SessionSummary};
use crate::{Error, Result};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short name used in logs and entity descriptors
    fn name(&self) -> &'static str;

    /// Summaries of matching sessions, newest first
    async fn get_all_sessions(
        &self,
        user_id: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>>;

    /// Read a session; a user filter that does not match hides it
    async fn read_session(&self, session_id: &str, user_id: Option<&str>)
        -> Result<Option<Session>>;

    /// Record `run` in `session_id`, creating the session when absent.
    ///
    /// A run already stored under the same id is replaced in place.
    async fn append_run(&self, session_id: &str, run: Run) -> Result<()>;

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<()>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

pub(crate) fn visible_to(session: &Session, user_id: Option<&str>) -> bool {
    match (user_id, session.user_id.as_deref()) {
        (Some(wanted), Some(owner)) => wanted == owner,
        _ => true,
    }
}

pub(crate) fn summaries<'a>(
    sessions: impl Iterator<Item = &'a Session>,
    user_id: Option<&str>,
    entity_id: Option<&str>,
) -> Vec<SessionSummary> {
    let mut matching: Vec<&Session> = sessions
        .filter(|s| visible_to(s, user_id))
        .filter(|s| entity_id.map_or(true, |id| s.belongs_to(id)))
        .collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matching.into_iter().map(SessionSummary::from).collect()
}

/// Shared append semantics for the cached stores.
pub(crate) fn apply_append<'a>(
    sessions: &'a mut HashMap<String, Session>,
    session_id: &str,
    run: Run,
) -> Result<&'a Session> {
    let session = sessions
        .entry(session_id.to_string())
        .or_insert_with(|| Session::for_run(session_id, &run));

    if run.team_session_id.is_none() && !session.belongs_to(&run.entity_id) {
        return Err(Error::SessionConflict {
            session_id: session_id.to_string(),
            owner: session.entity_id.clone(),
            entity_id: run.entity_id,
        });
    }

    session.upsert_run(run);
    Ok(session)
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store must share.

    use super::*;
    use crate::event::EventKind;
    use crate::kind::EntityKind;
    use crate::run::RunStatus;
    use serde_json::json;

    pub fn finished_run(session_id: &str, entity_id: &str, message: &str) -> Run {
        let mut run = Run::new(session_id, entity_id, EntityKind::Agent, json!(message));
        run.transition(RunStatus::Running).unwrap();
        run.record(EventKind::content_delta("reply")).unwrap();
        run.record(EventKind::Completed {}).unwrap();
        run
    }

    pub async fn sequential_runs_are_kept_in_order(store: &dyn SessionStore) {
        store
            .append_run("s1", finished_run("s1", "writer", "first"))
            .await
            .unwrap();
        store
            .append_run("s1", finished_run("s1", "writer", "second"))
            .await
            .unwrap();

        let session = store.read_session("s1", None).await.unwrap().unwrap();
        let inputs: Vec<_> = session.runs.iter().filter_map(Run::input_text).collect();
        assert_eq!(inputs, vec!["first", "second"]);
    }

    pub async fn updates_replace_the_same_run(store: &dyn SessionStore) {
        let mut run = Run::new("s2", "writer", EntityKind::Agent, json!("hi"));
        run.transition(RunStatus::Running).unwrap();
        store.append_run("s2", run.clone()).await.unwrap();
        run.record(EventKind::Completed {}).unwrap();
        store.append_run("s2", run.clone()).await.unwrap();

        let session = store.read_session("s2", None).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].status, RunStatus::Completed);
    }

    pub async fn foreign_runs_are_rejected(store: &dyn SessionStore) {
        store
            .append_run("s3", finished_run("s3", "writer", "hi"))
            .await
            .unwrap();
        let err = store
            .append_run("s3", finished_run("s3", "critic", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionConflict { .. }));

        let member = finished_run("s3/critic", "critic", "hi").with_team_session("s3");
        store.append_run("s3", member).await.unwrap();
    }

    pub async fn rename_delete_and_listing(store: &dyn SessionStore) {
        let mut run = finished_run("s4", "writer", "draft a haiku");
        run.user_id = Some("alice".into());
        store.append_run("s4", run).await.unwrap();
        store
            .append_run("s5", finished_run("s5", "critic", "review"))
            .await
            .unwrap();

        let listed = store.get_all_sessions(None, Some("writer")).await.unwrap();
        assert!(listed.iter().any(|s| s.session_id == "s4"));
        assert!(listed.iter().all(|s| s.entity_id == "writer"));
        assert!(store
            .read_session("s4", Some("bob"))
            .await
            .unwrap()
            .is_none());

        store.rename_session("s4", "Poems").await.unwrap();
        let session = store.read_session("s4", Some("alice")).await.unwrap().unwrap();
        assert_eq!(session.metadata.session_name.as_deref(), Some("Poems"));

        store.delete_session("s4").await.unwrap();
        assert!(store.read_session("s4", None).await.unwrap().is_none());
        assert!(matches!(
            store.delete_session("s4").await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            store.rename_session("missing", "x").await,
            Err(Error::SessionNotFound(_))
        ));
    }
}

//! In-memory session store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{apply_append, summaries, visible_to, SessionStore};
use crate::run::Run;
use crate::session::{Session, SessionSummary};
use crate::{Error, Result};

/// Session store that lives for the lifetime of the process
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_all_sessions(
        &self,
        user_id: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;
        Ok(summaries(sessions.values(), user_id, entity_id))
    }

    async fn read_session(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|s| visible_to(s, user_id))
            .cloned())
    }

    async fn append_run(&self, session_id: &str, run: Run) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        apply_append(&mut sessions, session_id, run)?;
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.metadata.session_name = Some(name.to_string());
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sequential_runs() {
        contract::sequential_runs_are_kept_in_order(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_updates_replace() {
        contract::updates_replace_the_same_run(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_foreign_runs() {
        contract::foreign_runs_are_rejected(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_rename_delete_listing() {
        contract::rename_delete_and_listing(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_one_session() {
        let store = Arc::new(MemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let run = contract::finished_run("shared", "writer", &format!("msg {}", i));
                store.append_run("shared", run).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let session = store.read_session("shared", None).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 16);
    }
}

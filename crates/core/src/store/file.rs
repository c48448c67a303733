//! File-backed session store
//!
//! Directory structure:
//! ```text
//! {data_dir}/
//!   sessions/
//!     {session_id}.json   # Session with all of its runs, id percent-encoded
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{apply_append, summaries, visible_to, SessionStore};
use crate::run::Run;
use crate::session::{Session, SessionSummary};
use crate::{Error, Result};

/// Session store persisting one JSON document per session
pub struct FileSessionStore {
    /// Directory holding the session files
    dir: PathBuf,
    /// In-memory cache of sessions
    cache: RwLock<HashMap<String, Session>>,
}

impl FileSessionStore {
    /// Open the store, loading any sessions already on disk.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join("sessions");
        tokio::fs::create_dir_all(&dir).await?;

        let mut cache = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_session(&path).await {
                Ok(session) => {
                    cache.insert(session.session_id.clone(), session);
                }
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} sessions from {}", cache.len(), dir.display());
        Ok(Self {
            dir,
            cache: RwLock::new(cache),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(session_id)))
    }

    /// Write one session to disk. Callers hold the cache write lock.
    async fn persist(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.session_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Saved session: {}", path.display());
        Ok(())
    }
}

async fn load_session(path: &Path) -> Result<Session> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_all_sessions(
        &self,
        user_id: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>> {
        let cache = self.cache.read().await;
        Ok(summaries(cache.values(), user_id, entity_id))
    }

    async fn read_session(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Session>> {
        let cache = self.cache.read().await;
        Ok(cache
            .get(session_id)
            .filter(|s| visible_to(s, user_id))
            .cloned())
    }

    async fn append_run(&self, session_id: &str, run: Run) -> Result<()> {
        let mut cache = self.cache.write().await;
        let previous = cache.get(session_id).cloned();
        let session = apply_append(&mut cache, session_id, run)?.clone();

        if let Err(e) = self.persist(&session).await {
            // Keep the cache consistent with what is on disk
            match previous {
                Some(previous) => cache.insert(session_id.to_string(), previous),
                None => cache.remove(session_id),
            };
            return Err(Error::Storage(format!(
                "Failed to persist session {}: {}",
                session_id, e
            )));
        }
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        let session = cache
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.metadata.session_name = Some(name.to_string());
        session.updated_at = Utc::now();
        let session = session.clone();
        self.persist(&session).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        if cache.remove(session_id).is_none() {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        let path = self.session_path(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Deleted session: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileSessionStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_sequential_runs() {
        let (store, _temp) = create_test_store().await;
        contract::sequential_runs_are_kept_in_order(&store).await;
    }

    #[tokio::test]
    async fn test_updates_replace() {
        let (store, _temp) = create_test_store().await;
        contract::updates_replace_the_same_run(&store).await;
    }

    #[tokio::test]
    async fn test_foreign_runs() {
        let (store, _temp) = create_test_store().await;
        contract::foreign_runs_are_rejected(&store).await;
    }

    #[tokio::test]
    async fn test_rename_delete_listing() {
        let (store, _temp) = create_test_store().await;
        contract::rename_delete_and_listing(&store).await;
    }

    #[tokio::test]
    async fn test_sessions_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileSessionStore::open(temp_dir.path()).await.unwrap();
            store
                .append_run("s1", contract::finished_run("s1", "writer", "draft a haiku"))
                .await
                .unwrap();
            store.rename_session("s1", "Poems").await.unwrap();
        }

        let reopened = FileSessionStore::open(temp_dir.path()).await.unwrap();
        let session = reopened.read_session("s1", None).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].content(), "reply");
        assert_eq!(session.metadata.session_name.as_deref(), Some("Poems"));
    }

    #[tokio::test]
    async fn test_distinct_ids_get_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let ids = ["a/b", "a_b", "a%2Fb", "..", "team/writer"];
        {
            let store = FileSessionStore::open(temp_dir.path()).await.unwrap();
            for id in ids {
                store
                    .append_run(id, contract::finished_run(id, "writer", id))
                    .await
                    .unwrap();
            }
        }

        let reopened = FileSessionStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(
            reopened.get_all_sessions(None, None).await.unwrap().len(),
            ids.len()
        );
        for id in ids {
            let session = reopened.read_session(id, None).await.unwrap().unwrap();
            assert_eq!(session.runs.len(), 1);
            assert_eq!(session.runs[0].input, serde_json::json!(id));
        }

        reopened.delete_session("a/b").await.unwrap();
        let reopened = FileSessionStore::open(temp_dir.path()).await.unwrap();
        assert!(reopened.read_session("a/b", None).await.unwrap().is_none());
        assert!(reopened.read_session("a_b", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_files_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("sessions");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();

        let store = FileSessionStore::open(temp_dir.path()).await.unwrap();
        assert!(store.get_all_sessions(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileSessionStore::open(temp_dir.path()).await.unwrap());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let run = contract::finished_run("shared", "writer", &format!("msg {}", i));
                store.append_run("shared", run).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = FileSessionStore::open(temp_dir.path()).await.unwrap();
        let session = reopened.read_session("shared", None).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 8);
    }
}

//! Run dispatcher - maps external requests onto entities and the engine
//!
//! The dispatcher resolves the entity, decides between a new and a continuing
//! session, picks the delivery mode and hands off to the [`RunEngine`]. It
//! also exposes the session management operations of each entity's store.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use playground_core::{
    EntityKind, ResumeRequest, Run, SessionStore, SessionSummary, SessionView, ToolResolution,
    UserMemory,
};

use crate::config::EngineConfig;
use crate::engine::{RunEngine, RunHandle, RunResponse, StartRun};
use crate::entity::{Entity, EntityDescriptor, ReturnMode};
use crate::error::{Result, RunError};
use crate::registry::EntityRegistry;

/// How a run's events are delivered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Collected into one response after the segment ends
    Buffered,
    /// Delivered one at a time as they are produced
    Streaming,
}

impl RunMode {
    pub fn from_flag(stream: bool) -> Self {
        if stream {
            Self::Streaming
        } else {
            Self::Buffered
        }
    }
}

/// Request to start a run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub entity_id: String,
    pub input: Value,
    /// Absent or empty starts a new session
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub stream: bool,
}

/// Request to continue a paused run
#[derive(Debug, Clone)]
pub struct ContinueRequest {
    pub entity_id: String,
    pub run_id: String,
    pub session_id: Option<String>,
    pub resolutions: Vec<ToolResolution>,
    pub stream: bool,
}

pub enum RunOutcome {
    Streaming(RunHandle),
    Buffered(RunResponse),
}

impl RunOutcome {
    /// Collect a streaming outcome; buffered outcomes are returned as is.
    pub async fn into_response(self) -> RunResponse {
        match self {
            Self::Streaming(handle) => handle.into_response().await,
            Self::Buffered(response) => response,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<EntityRegistry>,
    engine: RunEngine,
}

impl Dispatcher {
    pub fn new(registry: Arc<EntityRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            engine: RunEngine::new(config),
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn entity(&self, entity_id: &str) -> Result<&Entity> {
        self.registry
            .get(entity_id)
            .ok_or_else(|| RunError::EntityNotFound {
                entity_id: entity_id.to_string(),
            })
    }

    /// Descriptors of all entities, optionally of one kind
    pub fn entities(&self, kind: Option<EntityKind>) -> Vec<EntityDescriptor> {
        self.registry
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .map(Entity::descriptor)
            .collect()
    }

    pub async fn create_run(&self, request: RunRequest) -> Result<RunOutcome> {
        let entity = self.entity(&request.entity_id)?;
        entity.validate_input(&request.input)?;

        let session_id = match request.session_id.filter(|s| !s.is_empty()) {
            Some(session_id) => {
                debug!("Continuing session {}", session_id);
                session_id
            }
            None => {
                let session_id = Uuid::new_v4().to_string();
                debug!("Starting new session {}", session_id);
                session_id
            }
        };

        let mode = select_mode(entity, request.stream);
        info!(entity = %entity.id(), ?mode, "Creating run");

        let handle = self
            .engine
            .start(
                entity,
                StartRun {
                    session_id,
                    user_id: request.user_id,
                    input: request.input,
                },
            )
            .await?;
        Ok(deliver(handle, mode).await)
    }

    pub async fn continue_run(&self, request: ContinueRequest) -> Result<RunOutcome> {
        let entity = self.entity(&request.entity_id)?;
        let mode = select_mode(entity, request.stream);

        let handle = self
            .engine
            .resume(
                entity,
                request.session_id.as_deref(),
                ResumeRequest {
                    run_id: request.run_id,
                    resolutions: request.resolutions,
                },
            )
            .await?;
        Ok(deliver(handle, mode).await)
    }

    pub async fn list_sessions(
        &self,
        entity_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>> {
        let store = self.storage(entity_id)?;
        Ok(store.get_all_sessions(user_id, Some(entity_id)).await?)
    }

    /// Display view of a session; team member sub-runs are left out.
    pub async fn get_session(
        &self,
        entity_id: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<SessionView> {
        let store = self.storage(entity_id)?;
        match store.read_session(session_id, user_id).await? {
            Some(session) if session.belongs_to(entity_id) => Ok(session.view()),
            _ => Err(RunError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// Full stored run, used by clients reconnecting to a run's transcript.
    pub async fn get_run(&self, entity_id: &str, session_id: &str, run_id: &str) -> Result<Run> {
        let store = self.storage(entity_id)?;
        let session = match store.read_session(session_id, None).await? {
            Some(session) if session.belongs_to(entity_id) => session,
            _ => {
                return Err(RunError::SessionNotFound {
                    session_id: session_id.to_string(),
                })
            }
        };
        session
            .find_run(run_id)
            .cloned()
            .ok_or_else(|| RunError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    pub async fn rename_session(
        &self,
        entity_id: &str,
        session_id: &str,
        name: &str,
    ) -> Result<()> {
        let store = self.storage(entity_id)?;
        self.ensure_owned(&store, entity_id, session_id).await?;
        store.rename_session(session_id, name).await?;
        Ok(())
    }

    pub async fn delete_session(&self, entity_id: &str, session_id: &str) -> Result<()> {
        let store = self.storage(entity_id)?;
        self.ensure_owned(&store, entity_id, session_id).await?;
        store.delete_session(session_id).await?;
        info!(entity = %entity_id, "Deleted session {}", session_id);
        Ok(())
    }

    pub async fn memories(&self, entity_id: &str, user_id: &str) -> Result<Vec<UserMemory>> {
        let entity = self.entity(entity_id)?;
        let memory = entity.memory().ok_or_else(|| RunError::MemoryUnavailable {
            entity_id: entity_id.to_string(),
        })?;
        Ok(memory.get_user_memories(user_id).await?)
    }

    fn storage(&self, entity_id: &str) -> Result<Arc<dyn SessionStore>> {
        self.entity(entity_id)?
            .storage()
            .ok_or_else(|| RunError::StorageUnavailable {
                entity_id: entity_id.to_string(),
            })
    }

    async fn ensure_owned(
        &self,
        store: &Arc<dyn SessionStore>,
        entity_id: &str,
        session_id: &str,
    ) -> Result<()> {
        let sessions = store.get_all_sessions(None, Some(entity_id)).await?;
        if sessions.iter().any(|s| s.session_id == session_id) {
            Ok(())
        } else {
            Err(RunError::SessionNotFound {
                session_id: session_id.to_string(),
            })
        }
    }
}

/// Single-shot workflows produce one value and are always buffered.
fn select_mode(entity: &Entity, stream: bool) -> RunMode {
    match entity.return_mode() {
        ReturnMode::SingleShot => RunMode::Buffered,
        ReturnMode::Streaming => RunMode::from_flag(stream),
    }
}

async fn deliver(handle: RunHandle, mode: RunMode) -> RunOutcome {
    match mode {
        RunMode::Streaming => RunOutcome::Streaming(handle),
        RunMode::Buffered => RunOutcome::Buffered(handle.into_response().await),
    }
}

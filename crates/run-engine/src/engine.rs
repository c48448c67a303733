//! Run engine - drives entity event streams into persisted runs
//!
//! Every run is produced by a background task that pulls the entity's stream
//! one event at a time, records it on the run, checkpoints the run to the
//! session store and hands the event to the consumer through a bounded
//! channel. A slow consumer therefore slows the producer down; a consumer
//! that goes away only detaches the view, the run itself continues to its
//! terminal state and is persisted.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use playground_core::{
    EventKind, ResumeRequest, Run, RunEvent, RunStatus, Session, SessionStore, ToolCall,
};

use crate::config::EngineConfig;
use crate::entity::{Entity, EntityStream, RunContext};
use crate::error::{Result, RunError};

/// Request to start a new run
#[derive(Debug, Clone)]
pub struct StartRun {
    pub session_id: String,
    pub user_id: Option<String>,
    pub input: Value,
}

/// Collected result of a run segment
///
/// A resumed run reports only the events of the segment that followed the
/// resume; `content` is the text of that segment and the first event's `seq`
/// continues from the stored transcript. The whole transcript is on the
/// stored [`Run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub session_id: String,
    pub entity_id: String,
    pub status: RunStatus,
    pub content: String,
    pub events: Vec<RunEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResponse {
    pub fn from_events(
        run_id: impl Into<String>,
        session_id: impl Into<String>,
        entity_id: impl Into<String>,
        events: Vec<RunEvent>,
    ) -> Self {
        let mut content = String::new();
        let mut status = RunStatus::Running;
        let mut pending_tool_calls = Vec::new();
        let mut error = None;

        for event in &events {
            match &event.kind {
                EventKind::ContentDelta { content: delta } => content.push_str(delta),
                EventKind::Paused { pending } => {
                    status = RunStatus::Paused;
                    pending_tool_calls = pending.clone();
                }
                EventKind::Completed {} => {
                    status = RunStatus::Completed;
                    pending_tool_calls.clear();
                }
                EventKind::Error { message } => {
                    status = RunStatus::Errored;
                    pending_tool_calls.clear();
                    error = Some(message.clone());
                }
                _ => {}
            }
        }

        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            entity_id: entity_id.into(),
            status,
            content,
            events,
            pending_tool_calls,
            error,
        }
    }
}

/// Consumer side of a run: a stream of its events in order
pub struct RunHandle {
    run_id: String,
    session_id: String,
    entity_id: String,
    events: ReceiverStream<RunEvent>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Drain every event and collect them into a response.
    pub async fn into_response(self) -> RunResponse {
        let Self {
            run_id,
            session_id,
            entity_id,
            events,
        } = self;
        let events: Vec<RunEvent> = events.collect().await;
        RunResponse::from_events(run_id, session_id, entity_id, events)
    }
}

impl Stream for RunHandle {
    type Item = RunEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("session_id", &self.session_id)
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

/// Executes runs and resumes paused ones
#[derive(Clone)]
pub struct RunEngine {
    config: EngineConfig,
    /// Runs currently being resumed
    resuming: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive claim on resuming one run, released when dropped
struct ResumeClaim {
    resuming: Arc<Mutex<HashSet<String>>>,
    run_id: String,
}

impl ResumeClaim {
    fn acquire(resuming: &Arc<Mutex<HashSet<String>>>, run_id: &str) -> Option<Self> {
        let mut runs = resuming.lock().unwrap_or_else(|e| e.into_inner());
        runs.insert(run_id.to_string()).then(|| Self {
            resuming: Arc::clone(resuming),
            run_id: run_id.to_string(),
        })
    }
}

impl Drop for ResumeClaim {
    fn drop(&mut self) {
        let mut runs = self.resuming.lock().unwrap_or_else(|e| e.into_inner());
        runs.remove(&self.run_id);
    }
}

impl RunEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            resuming: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new run of `entity`.
    ///
    /// The run exists (and is persisted when the entity has storage) before
    /// this returns; everything after that, failures included, is reported
    /// through the returned handle.
    pub async fn start(&self, entity: &Entity, request: StartRun) -> Result<RunHandle> {
        let storage = entity.storage();

        let history = match &storage {
            Some(store) => match store.read_session(&request.session_id, None).await? {
                Some(session) if !session.belongs_to(entity.id()) => {
                    return Err(RunError::SessionConflict {
                        session_id: request.session_id,
                    });
                }
                Some(session) => {
                    debug!("Continuing session {}", session.session_id);
                    session.history(self.config.history_runs)
                }
                None => {
                    debug!("Creating new session {}", request.session_id);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut run = Run::new(
            request.session_id,
            entity.id(),
            entity.kind(),
            request.input,
        )
        .with_user(request.user_id);
        run.transition(RunStatus::Running)?;

        if let Some(store) = &storage {
            store.append_run(&run.session_id, run.clone()).await?;
        }

        info!(
            run_id = %run.run_id,
            session_id = %run.session_id,
            entity = %entity.id(),
            "Starting {} run",
            entity.kind()
        );

        let ctx = RunContext::for_run(&run, history)
            .with_max_tool_rounds(self.config.max_tool_rounds);
        let stream = entity.run(ctx);
        Ok(self.spawn(run, storage, stream, None))
    }

    /// Resume a paused run with a complete set of resolutions.
    ///
    /// Nothing is changed unless the resolutions match the pending calls
    /// exactly; a rejected resume leaves the run paused.
    pub async fn resume(
        &self,
        entity: &Entity,
        session_id: Option<&str>,
        request: ResumeRequest,
    ) -> Result<RunHandle> {
        if !entity.can_pause() {
            return Err(RunError::invalid_resume(format!(
                "{} runs never pause",
                entity.id()
            )));
        }
        let store = entity
            .storage()
            .ok_or_else(|| RunError::StorageUnavailable {
                entity_id: entity.id().to_string(),
            })?;

        let claim = ResumeClaim::acquire(&self.resuming, &request.run_id).ok_or_else(|| {
            RunError::invalid_resume(format!("Run {} is already being resumed", request.run_id))
        })?;

        let (run, stream) = self
            .prepare_resume(entity, &store, session_id, &request)
            .await?;
        info!(run_id = %run.run_id, entity = %entity.id(), "Resuming run");
        Ok(self.spawn(run, Some(store), stream, Some(claim)))
    }

    async fn prepare_resume(
        &self,
        entity: &Entity,
        store: &Arc<dyn SessionStore>,
        session_id: Option<&str>,
        request: &ResumeRequest,
    ) -> Result<(Run, EntityStream)> {
        let session = locate_session(entity, store, session_id, &request.run_id).await?;
        let mut run = session
            .find_run(&request.run_id)
            .filter(|r| r.entity_id == entity.id())
            .cloned()
            .ok_or_else(|| RunError::RunNotFound {
                run_id: request.run_id.clone(),
            })?;

        let resolved = run.resolve(&request.resolutions)?;
        store.append_run(&session.session_id, run.clone()).await?;

        let history = session.history(self.config.history_runs);
        let ctx = RunContext::for_run(&run, history)
            .with_max_tool_rounds(self.config.max_tool_rounds);
        let stream = entity.continue_run(ctx, resolved)?;
        Ok((run, stream))
    }

    fn spawn(
        &self,
        run: Run,
        storage: Option<Arc<dyn SessionStore>>,
        stream: EntityStream,
        claim: Option<ResumeClaim>,
    ) -> RunHandle {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let handle = RunHandle {
            run_id: run.run_id.clone(),
            session_id: run.session_id.clone(),
            entity_id: run.entity_id.clone(),
            events: ReceiverStream::new(rx),
        };

        tokio::spawn(async move {
            let run = drive(run, storage, stream, tx, claim).await;
            info!(
                run_id = %run.run_id,
                status = run.status.as_str(),
                events = run.events.len(),
                "Run segment finished"
            );
        });

        handle
    }
}

impl Default for RunEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Find the session holding `run_id`, scanning the entity's sessions when
/// the caller did not name one.
async fn locate_session(
    entity: &Entity,
    store: &Arc<dyn SessionStore>,
    session_id: Option<&str>,
    run_id: &str,
) -> Result<Session> {
    if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
        return match store.read_session(session_id, None).await? {
            Some(session) if session.belongs_to(entity.id()) => Ok(session),
            _ => Err(RunError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
        };
    }

    warn!(run_id, "Continuing a run without a session id; scanning sessions");
    for summary in store.get_all_sessions(None, Some(entity.id())).await? {
        if let Some(session) = store.read_session(&summary.session_id, None).await? {
            if session.find_run(run_id).is_some() {
                return Ok(session);
            }
        }
    }
    Err(RunError::RunNotFound {
        run_id: run_id.to_string(),
    })
}

/// Pull the entity stream to the end of the segment and return the final run.
///
/// A resume claim is held until the segment's last event is persisted and
/// released before that event reaches the consumer, so a caller reacting to
/// a `paused` event can resume again at once.
async fn drive(
    mut run: Run,
    storage: Option<Arc<dyn SessionStore>>,
    stream: EntityStream,
    tx: mpsc::Sender<RunEvent>,
    mut claim: Option<ResumeClaim>,
) -> Run {
    let mut stream = AssertUnwindSafe(stream).catch_unwind();
    let mut attached = true;

    loop {
        let kind = match stream.next().await {
            Some(Ok(Ok(kind))) => kind,
            Some(Ok(Err(e))) => {
                warn!(run_id = %run.run_id, "Run failed: {}", e);
                EventKind::error(e.to_string())
            }
            Some(Err(panic)) => {
                error!(run_id = %run.run_id, "Entity panicked: {}", panic_message(&*panic));
                EventKind::error(format!("Entity panicked: {}", panic_message(&*panic)))
            }
            None => EventKind::Completed {},
        };

        let event = match run.record(kind) {
            Ok(event) => event,
            Err(e) => match run.record(EventKind::error(e.to_string())) {
                Ok(event) => event,
                Err(e) => {
                    error!(run_id = %run.run_id, "Cannot record event: {}", e);
                    break;
                }
            },
        };

        let terminal = event.is_terminal();
        if terminal || event.kind.is_tool_boundary() {
            checkpoint(&storage, &run).await;
        }
        if terminal {
            drop(claim.take());
        }

        if attached && tx.send(event).await.is_err() {
            attached = false;
            info!(run_id = %run.run_id, "Consumer detached; run continues in background");
        }

        if terminal {
            break;
        }
    }

    run
}

async fn checkpoint(storage: &Option<Arc<dyn SessionStore>>, run: &Run) {
    if let Some(store) = storage {
        if let Err(e) = store.append_run(&run.session_id, run.clone()).await {
            error!(run_id = %run.run_id, "Failed to persist run: {}", e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

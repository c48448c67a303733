//! Workflows
//!
//! A workflow is either a single-shot handler that returns one value, or an
//! ordered list of steps (agents and functions) whose outputs are chained and
//! streamed as they are produced. Workflows never pause.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use playground_core::{input_text, EventKind, SessionStore};

use crate::agent::Agent;
use crate::entity::{EntityStream, ReturnMode, RunContext};
use crate::error::{Result, RunError};
use crate::model::render_value;

#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn run(&self, input: Value) -> Result<Value>;
}

/// Handler backed by an async closure
pub struct FnHandler<F>(F);

impl<F, Fut> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(handler: F) -> Arc<dyn WorkflowHandler> {
        Arc::new(Self(handler))
    }
}

#[async_trait]
impl<F, Fut> WorkflowHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn run(&self, input: Value) -> Result<Value> {
        (self.0)(input).await
    }
}

#[derive(Clone)]
pub enum WorkflowStep {
    Agent(Arc<Agent>),
    Function {
        name: String,
        handler: Arc<dyn WorkflowHandler>,
    },
}

impl WorkflowStep {
    pub fn agent(agent: Agent) -> Self {
        Self::Agent(Arc::new(agent))
    }

    pub fn function(name: impl Into<String>, handler: Arc<dyn WorkflowHandler>) -> Self {
        Self::Function {
            name: name.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Agent(agent) => agent.id(),
            Self::Function { name, .. } => name,
        }
    }
}

#[derive(Clone)]
pub enum WorkflowBody {
    SingleShot(Arc<dyn WorkflowHandler>),
    Steps(Vec<WorkflowStep>),
}

pub struct Workflow {
    id: String,
    name: String,
    description: Option<String>,
    body: WorkflowBody,
    storage: Option<Arc<dyn SessionStore>>,
}

impl Workflow {
    pub fn single_shot(id: impl Into<String>, handler: Arc<dyn WorkflowHandler>) -> Self {
        Self::new(id, WorkflowBody::SingleShot(handler))
    }

    pub fn steps(id: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self::new(id, WorkflowBody::Steps(steps))
    }

    fn new(id: impl Into<String>, body: WorkflowBody) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            body,
            storage: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn SessionStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn storage(&self) -> Option<&Arc<dyn SessionStore>> {
        self.storage.as_ref()
    }

    pub fn return_mode(&self) -> ReturnMode {
        match self.body {
            WorkflowBody::SingleShot(_) => ReturnMode::SingleShot,
            WorkflowBody::Steps(_) => ReturnMode::Streaming,
        }
    }

    pub fn step_names(&self) -> Vec<String> {
        match &self.body {
            WorkflowBody::SingleShot(_) => Vec::new(),
            WorkflowBody::Steps(steps) => steps.iter().map(|s| s.name().to_string()).collect(),
        }
    }

    /// Workflow inputs are keyword arguments: a JSON object.
    pub fn validate_input(&self, input: &Value) -> Result<()> {
        if input.is_object() {
            Ok(())
        } else {
            Err(RunError::unsupported_input(format!(
                "{} expects a JSON object of named inputs",
                self.id
            )))
        }
    }

    pub fn run(&self, ctx: RunContext) -> EntityStream {
        match &self.body {
            WorkflowBody::SingleShot(handler) => single_shot(handler.clone(), ctx.input),
            WorkflowBody::Steps(steps) => run_steps(self.id.clone(), steps.clone(), ctx),
        }
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("return_mode", &self.return_mode())
            .field("steps", &self.step_names())
            .finish()
    }
}

fn single_shot(handler: Arc<dyn WorkflowHandler>, input: Value) -> EntityStream {
    let stream = async_stream::stream! {
        match handler.run(input).await {
            Ok(output) => {
                yield Ok(EventKind::content_delta(render_value(&output)));
                yield Ok(EventKind::Completed {});
            }
            Err(e) => yield Err(e),
        }
    };
    Box::pin(stream)
}

fn run_steps(workflow_id: String, steps: Vec<WorkflowStep>, ctx: RunContext) -> EntityStream {
    let stream = async_stream::stream! {
        let mut current = ctx.input.clone();

        for step in &steps {
            debug!(workflow = %workflow_id, step = %step.name(), "Running workflow step");
            match step {
                WorkflowStep::Agent(agent) => {
                    let message = input_text(&current).unwrap_or_else(|| render_value(&current));
                    let step_ctx = RunContext {
                        input: Value::String(message),
                        history: Vec::new(),
                        transcript: Vec::new(),
                        ..ctx.clone()
                    };

                    let mut output = String::new();
                    let mut failure = None;
                    let mut events = agent.run(step_ctx);
                    while let Some(item) = events.next().await {
                        match item {
                            Ok(EventKind::ContentDelta { content }) => {
                                output.push_str(&content);
                                yield Ok(EventKind::ContentDelta { content });
                            }
                            Ok(EventKind::Completed {}) => break,
                            Ok(EventKind::Paused { .. }) => {
                                failure = Some(RunError::execution(format!(
                                    "Step {} needs tool resolution, which workflows do not support",
                                    agent.id()
                                )));
                                break;
                            }
                            Ok(EventKind::Error { message }) => {
                                failure = Some(RunError::execution(message));
                                break;
                            }
                            Ok(other) => yield Ok(other),
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    if let Some(e) = failure {
                        yield Err(e);
                        return;
                    }
                    current = Value::String(output);
                }
                WorkflowStep::Function { handler, .. } => {
                    match handler.run(current.clone()).await {
                        Ok(output) => {
                            yield Ok(EventKind::content_delta(render_value(&output)));
                            current = output;
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        }

        yield Ok(EventKind::Completed {});
    };
    Box::pin(stream)
}

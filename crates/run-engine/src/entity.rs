//! Executable entities
//!
//! Agents, teams and workflows share one execution contract: given a run
//! context they produce a lazy stream of event kinds, and those that can
//! pause can also be continued from a stored transcript.

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use playground_core::{
    EntityKind, EventKind, PendingToolCall, Run, RunEvent, SessionStore, UserMemoryStore,
};

use crate::agent::Agent;
use crate::config::DEFAULT_MAX_TOOL_ROUNDS;
use crate::error::{Result, RunError};
use crate::team::Team;
use crate::tool::ToolContext;
use crate::workflow::Workflow;

/// Event kinds produced by an entity. `Err` items end the run with an
/// error event.
pub type EntityStream = BoxStream<'static, Result<EventKind>>;

/// How an entity delivers its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// One final value; always delivered buffered
    SingleShot,
    /// Incremental events; delivered buffered or streamed on request
    Streaming,
}

/// Everything an entity needs to execute one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub input: Value,
    /// Earlier completed runs of the session, oldest first
    pub history: Vec<Run>,
    /// Events already recorded for this run (non-empty when continuing)
    pub transcript: Vec<RunEvent>,
    /// Model/tool round trips allowed to agents without their own limit
    pub max_tool_rounds: usize,
}

impl RunContext {
    pub fn for_run(run: &Run, history: Vec<Run>) -> Self {
        Self {
            run_id: run.run_id.clone(),
            session_id: run.session_id.clone(),
            user_id: run.user_id.clone(),
            input: run.input.clone(),
            history,
            transcript: run.events.clone(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

/// Public description of a registered entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub description: Option<String>,
    pub storage: Option<String>,
    pub memory: bool,
    pub return_mode: ReturnMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum Entity {
    Agent(Arc<Agent>),
    Team(Arc<Team>),
    Workflow(Arc<Workflow>),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Self::Agent(agent) => agent.id(),
            Self::Team(team) => team.id(),
            Self::Workflow(workflow) => workflow.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Agent(agent) => agent.name(),
            Self::Team(team) => team.name(),
            Self::Workflow(workflow) => workflow.name(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Agent(agent) => agent.description(),
            Self::Team(team) => team.description(),
            Self::Workflow(workflow) => workflow.description(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Agent(_) => EntityKind::Agent,
            Self::Team(_) => EntityKind::Team,
            Self::Workflow(_) => EntityKind::Workflow,
        }
    }

    pub fn storage(&self) -> Option<Arc<dyn SessionStore>> {
        match self {
            Self::Agent(agent) => agent.storage().cloned(),
            Self::Team(team) => team.storage().cloned(),
            Self::Workflow(workflow) => workflow.storage().cloned(),
        }
    }

    pub fn memory(&self) -> Option<Arc<dyn UserMemoryStore>> {
        match self {
            Self::Agent(agent) => agent.memory().cloned(),
            Self::Team(team) => team.memory().cloned(),
            Self::Workflow(_) => None,
        }
    }

    pub fn return_mode(&self) -> ReturnMode {
        match self {
            Self::Workflow(workflow) => workflow.return_mode(),
            _ => ReturnMode::Streaming,
        }
    }

    /// Only entities that call tools can pause and be continued.
    pub fn can_pause(&self) -> bool {
        !matches!(self, Self::Workflow(_))
    }

    pub fn validate_input(&self, input: &Value) -> Result<()> {
        match self {
            Self::Agent(agent) => agent.validate_input(input),
            Self::Team(team) => team.validate_input(input),
            Self::Workflow(workflow) => workflow.validate_input(input),
        }
    }

    pub fn run(&self, ctx: RunContext) -> EntityStream {
        match self {
            Self::Agent(agent) => agent.run(ctx),
            Self::Team(team) => team.run(ctx),
            Self::Workflow(workflow) => workflow.run(ctx),
        }
    }

    pub fn continue_run(
        &self,
        ctx: RunContext,
        resolved: Vec<PendingToolCall>,
    ) -> Result<EntityStream> {
        match self {
            Self::Agent(agent) => Ok(agent.continue_run(ctx, resolved)),
            Self::Team(team) => Ok(team.continue_run(ctx, resolved)),
            Self::Workflow(workflow) => Err(RunError::invalid_resume(format!(
                "Workflow {} runs never pause",
                workflow.id()
            ))),
        }
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        let (tools, members) = match self {
            Self::Agent(agent) => (agent.tools().names(), Vec::new()),
            Self::Team(team) => (Vec::new(), team.member_ids()),
            Self::Workflow(workflow) => (Vec::new(), workflow.step_names()),
        };
        EntityDescriptor {
            id: self.id().to_string(),
            name: self.name().to_string(),
            kind: self.kind(),
            description: self.description().map(str::to_string),
            storage: self.storage().map(|s| s.name().to_string()),
            memory: self.memory().is_some(),
            return_mode: self.return_mode(),
            tools,
            members,
        }
    }
}

impl From<Agent> for Entity {
    fn from(agent: Agent) -> Self {
        Self::Agent(Arc::new(agent))
    }
}

impl From<Team> for Entity {
    fn from(team: Team) -> Self {
        Self::Team(Arc::new(team))
    }
}

impl From<Workflow> for Entity {
    fn from(workflow: Workflow) -> Self {
        Self::Workflow(Arc::new(workflow))
    }
}

//! Team: a leader agent that delegates tasks to member agents
//!
//! Each delegation runs the member as a sub-run under its own sub-session id
//! (`{team session}/{member id}`). The sub-run is recorded in the team's
//! session tagged with the team session id, but its events never reach the
//! team run's transcript; the leader only sees the member's final output as
//! a tool result.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use playground_core::{
    EntityKind, EventKind, PendingToolCall, Run, RunStatus, SessionStore, UserMemoryStore,
};

use crate::agent::Agent;
use crate::entity::{EntityStream, RunContext};
use crate::error::{Result, RunError};
use crate::tool::{Tool, ToolContext};

/// Name of the tool the leader uses to hand work to a member
pub const DELEGATE_TOOL: &str = "delegate_task_to_member";

pub struct Team {
    id: String,
    name: String,
    description: Option<String>,
    leader: Agent,
    members: Vec<Arc<Agent>>,
    storage: Option<Arc<dyn SessionStore>>,
    memory: Option<Arc<dyn UserMemoryStore>>,
}

impl Team {
    pub fn new(id: impl Into<String>, leader: Agent) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            leader,
            members: Vec::new(),
            storage: None,
            memory: None,
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

    pub fn with_member(mut self, member: Agent) -> Self {
        self.members.push(Arc::new(member));
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn SessionStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn UserMemoryStore>) -> Self {
        self.memory = Some(memory);
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

    pub fn memory(&self) -> Option<&Arc<dyn UserMemoryStore>> {
        self.memory.as_ref()
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id().to_string()).collect()
    }

    pub fn validate_input(&self, input: &Value) -> Result<()> {
        self.leader.validate_input(input)
    }

    pub fn run(&self, ctx: RunContext) -> EntityStream {
        self.coordinator().run(ctx)
    }

    pub fn continue_run(&self, ctx: RunContext, resolved: Vec<PendingToolCall>) -> EntityStream {
        self.coordinator().continue_run(ctx, resolved)
    }

    /// The leader, equipped with the delegation tool for this team.
    fn coordinator(&self) -> Arc<Agent> {
        let delegate = DelegateTool {
            team_id: self.id.clone(),
            members: self.members.clone(),
            storage: self.storage.clone(),
        };
        Arc::new(self.leader.clone().with_tool(delegate))
    }
}

impl std::fmt::Debug for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Team")
            .field("id", &self.id)
            .field("leader", &self.leader.id())
            .field("members", &self.member_ids())
            .finish()
    }
}

struct DelegateTool {
    team_id: String,
    members: Vec<Arc<Agent>>,
    storage: Option<Arc<dyn SessionStore>>,
}

impl DelegateTool {
    /// Run `member` on `task` to completion as a sub-run of the team session.
    async fn run_member(
        &self,
        member: &Arc<Agent>,
        task: &str,
        ctx: &ToolContext,
    ) -> Result<Run> {
        let sub_session = format!("{}/{}", ctx.session_id, member.id());
        let mut run = Run::new(sub_session, member.id(), EntityKind::Agent, json!(task))
            .with_user(ctx.user_id.clone())
            .with_team_session(ctx.session_id.clone());
        run.transition(RunStatus::Running)?;
        debug!(
            team = %self.team_id,
            member = %member.id(),
            run_id = %run.run_id,
            "Delegating task"
        );

        let member_ctx =
            RunContext::for_run(&run, Vec::new()).with_max_tool_rounds(ctx.max_tool_rounds);
        let mut events = member.run(member_ctx);
        while let Some(item) = events.next().await {
            let kind = match item {
                Ok(EventKind::Paused { .. }) => EventKind::error(format!(
                    "{} needs tool resolution, which is not available inside a team",
                    member.id()
                )),
                Ok(kind) => kind,
                Err(e) => EventKind::error(e.to_string()),
            };
            let terminal = kind.is_terminal();
            run.record(kind)?;
            if terminal {
                break;
            }
        }
        if !run.is_terminal() {
            run.record(EventKind::Completed {})?;
        }

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.append_run(&ctx.session_id, run.clone()).await {
                warn!(
                    team = %self.team_id,
                    member = %member.id(),
                    "Failed to record member run: {}",
                    e
                );
            }
        }
        Ok(run)
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL
    }

    fn description(&self) -> &str {
        "Hand a task to one of the team members and receive their answer."
    }

    fn parameters(&self) -> Value {
        let ids: Vec<&str> = self.members.iter().map(|m| m.id()).collect();
        json!({
            "type": "object",
            "properties": {
                "member_id": { "type": "string", "enum": ids },
                "task": { "type": "string" }
            },
            "required": ["member_id", "task"]
        })
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        let member_id = arguments["member_id"]
            .as_str()
            .ok_or_else(|| RunError::execution("delegation is missing `member_id`"))?;
        let task = arguments["task"]
            .as_str()
            .ok_or_else(|| RunError::execution("delegation is missing `task`"))?;
        let member = self
            .members
            .iter()
            .find(|m| m.id() == member_id)
            .ok_or_else(|| RunError::execution(format!("Unknown team member: {}", member_id)))?;

        let run = self.run_member(member, task, ctx).await?;
        match run.status {
            RunStatus::Completed => Ok(json!(run.content())),
            _ => Err(RunError::execution(format!(
                "{} failed: {}",
                member_id,
                run.error.unwrap_or_default()
            ))),
        }
    }
}

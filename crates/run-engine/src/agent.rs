//! Agent: a model with tools, driven in rounds until it stops calling tools
//!
//! Each round streams the model's text as content deltas, proposes every tool
//! call it made, executes the automatic ones and pauses when any call needs
//! the caller's resolution.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use playground_core::{
    input_text, EventKind, PendingToolCall, SessionStore, ToolCall, ToolResolution,
    UserMemoryStore,
};

use crate::entity::{EntityStream, RunContext};
use crate::error::{Result, RunError};
use crate::model::{render_value, transcript_messages, Message, Model, ModelDelta};
use crate::tool::{Tool, ToolContext, Toolkit};

#[derive(Clone)]
pub struct Agent {
    id: String,
    name: String,
    description: Option<String>,
    instructions: Option<String>,
    model: Arc<dyn Model>,
    tools: Toolkit,
    storage: Option<Arc<dyn SessionStore>>,
    memory: Option<Arc<dyn UserMemoryStore>>,
    /// Overrides the engine's round limit when set
    max_tool_rounds: Option<usize>,
}

impl Agent {
    pub fn new(id: impl Into<String>, model: Arc<dyn Model>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            instructions: None,
            model,
            tools: Toolkit::new(),
            storage: None,
            memory: None,
            max_tool_rounds: None,
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

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.insert(Arc::new(tool));
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

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = Some(rounds.max(1));
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

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn tools(&self) -> &Toolkit {
        &self.tools
    }

    pub fn storage(&self) -> Option<&Arc<dyn SessionStore>> {
        self.storage.as_ref()
    }

    pub fn memory(&self) -> Option<&Arc<dyn UserMemoryStore>> {
        self.memory.as_ref()
    }

    /// Agents take a plain string or an object with a string `message`.
    pub fn validate_input(&self, input: &Value) -> Result<()> {
        input_text(input).map(|_| ()).ok_or_else(|| {
            RunError::unsupported_input(format!(
                "{} expects a string or an object with a string `message`",
                self.id
            ))
        })
    }

    pub fn run(self: &Arc<Self>, ctx: RunContext) -> EntityStream {
        let messages = self.conversation(&ctx);
        self.drive(ctx.tool_context(), messages, Vec::new())
    }

    /// Continue a paused run: replay its transcript, apply the resolved
    /// calls, then keep going.
    pub fn continue_run(
        self: &Arc<Self>,
        ctx: RunContext,
        resolved: Vec<PendingToolCall>,
    ) -> EntityStream {
        let messages = self.conversation(&ctx);
        self.drive(ctx.tool_context(), messages, resolved)
    }

    fn conversation(&self, ctx: &RunContext) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(instructions) = &self.instructions {
            messages.push(Message::system(instructions.clone()));
        }
        for run in &ctx.history {
            messages.extend(transcript_messages(&run.input, &run.events));
        }
        messages.extend(transcript_messages(&ctx.input, &ctx.transcript));
        messages
    }

    fn drive(
        self: &Arc<Self>,
        tool_ctx: ToolContext,
        mut messages: Vec<Message>,
        resolved: Vec<PendingToolCall>,
    ) -> EntityStream {
        let agent = Arc::clone(self);

        let stream = async_stream::stream! {
            for call in &resolved {
                let (result, is_error) = agent.apply_resolution(call, &tool_ctx).await;
                messages.push(Message::tool(call.tool_call.id.clone(), render_value(&result)));
                yield Ok(EventKind::tool_result(&call.tool_call, result, is_error));
            }

            let specs = agent.tools.specs();
            let max_rounds = agent.max_tool_rounds.unwrap_or(tool_ctx.max_tool_rounds);
            let mut round = 0;

            loop {
                if round >= max_rounds {
                    yield Err(RunError::execution(format!(
                        "{} exceeded {} tool rounds",
                        agent.id, max_rounds
                    )));
                    return;
                }
                round += 1;
                debug!(
                    agent = %agent.id,
                    round,
                    messages = messages.len(),
                    "Requesting model response"
                );

                let mut response = match agent.model.respond(&messages, &specs).await {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut text = String::new();
                let mut calls: Vec<ToolCall> = Vec::new();
                while let Some(delta) = response.next().await {
                    match delta {
                        Ok(ModelDelta::Text(chunk)) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            text.push_str(&chunk);
                            yield Ok(EventKind::content_delta(chunk));
                        }
                        Ok(ModelDelta::ToolCall(call)) => calls.push(call),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                messages.push(Message::assistant(text, calls.clone()));

                if calls.is_empty() {
                    yield Ok(EventKind::Completed {});
                    return;
                }

                let mut deferred = Vec::new();
                for call in &calls {
                    let needs_resolution = agent.tools.requires_resolution(&call.name);
                    if needs_resolution {
                        deferred.push(call.clone());
                    }
                    yield Ok(EventKind::tool_call_proposed(call, needs_resolution));
                }

                for call in &calls {
                    if agent.tools.requires_resolution(&call.name) {
                        continue;
                    }
                    let (result, is_error) = agent.execute(call, &tool_ctx).await;
                    messages.push(Message::tool(call.id.clone(), render_value(&result)));
                    yield Ok(EventKind::tool_result(call, result, is_error));
                }

                if !deferred.is_empty() {
                    debug!(
                        agent = %agent.id,
                        pending = deferred.len(),
                        "Pausing for tool resolution"
                    );
                    yield Ok(EventKind::Paused { pending: deferred });
                    return;
                }
            }
        };

        Box::pin(stream)
    }

    /// Run a tool. Failures become error results the model can react to.
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> (Value, bool) {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(agent = %self.id, tool = %call.name, "Model called an unknown tool");
            return (json!(format!("Unknown tool: {}", call.name)), true);
        };
        match tool.call(call.arguments.clone(), ctx).await {
            Ok(result) => (result, false),
            Err(e) => {
                warn!(agent = %self.id, tool = %call.name, "Tool failed: {}", e);
                (json!(e.to_string()), true)
            }
        }
    }

    async fn apply_resolution(&self, call: &PendingToolCall, ctx: &ToolContext) -> (Value, bool) {
        match &call.resolution {
            Some(ToolResolution {
                result: Some(result),
                ..
            }) => (result.clone(), false),
            Some(ToolResolution {
                confirmed: Some(true),
                ..
            }) => self.execute(&call.tool_call, ctx).await,
            _ => (
                json!(format!("{} was rejected by the user", call.tool_call.name)),
                true,
            ),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("model", &self.model.id())
            .field("tools", &self.tools.names())
            .finish()
    }
}

//! Demo registry served by the binary
//!
//! The entities run on [`EchoModel`], a model that needs no provider: it
//! echoes the user's message back word by word, reports tool results, and
//! turns `/<tool> <arguments>` messages into tool calls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use uuid::Uuid;

use playground_core::{InMemoryUserMemory, SessionStore, ToolCall, UserMemory, UserMemoryStore};
use run_engine::{
    Agent, EntityRegistry, FnHandler, FnTool, Message, MessageRole, Model, ModelDelta,
    ModelStream, Result, RunError, Team, ToolPolicy, ToolSpec, Workflow, WorkflowStep,
};

pub struct EchoModel {
    id: String,
}

impl EchoModel {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { id: id.into() })
    }
}

#[async_trait]
impl Model for EchoModel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn respond(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelStream> {
        let deltas = match messages.last() {
            Some(m) if m.role == MessageRole::Tool => {
                vec![ModelDelta::Text(format!("Tool returned: {}", m.content))]
            }
            Some(m) if m.role == MessageRole::User => match parse_command(&m.content, tools) {
                Some(call) => vec![ModelDelta::ToolCall(call)],
                None => words(&m.content),
            },
            _ => vec![ModelDelta::Text("Nothing to echo.".to_string())],
        };
        Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
    }
}

/// `/name {"json": "arguments"}` or `/name free text`
fn parse_command(text: &str, tools: &[ToolSpec]) -> Option<ToolCall> {
    let command = text.trim().strip_prefix('/')?;
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    if !tools.iter().any(|t| t.name == name) {
        return None;
    }

    let arguments = match serde_json::from_str::<Value>(rest) {
        Ok(value) if value.is_object() => value,
        _ => json!({ "input": rest.trim() }),
    };
    Some(ToolCall::new(
        format!("call_{}", Uuid::new_v4().simple()),
        name,
        arguments,
    ))
}

fn words(text: &str) -> Vec<ModelDelta> {
    text.split_inclusive(' ')
        .map(|w| ModelDelta::Text(w.to_string()))
        .collect()
}

fn writer() -> Agent {
    Agent::new("writer", EchoModel::new("echo"))
        .with_name("Writer")
        .with_description("Repeats whatever it is asked to write")
}

fn assistant(storage: Arc<dyn SessionStore>, memory: Arc<dyn UserMemoryStore>) -> Agent {
    let clock = FnTool::new("clock", |_| async { Ok(json!(Utc::now().to_rfc3339())) })
        .with_description("Current time in UTC");

    let delete_notes = FnTool::new("delete_notes", |args: Value| async move {
        Ok(json!({ "deleted": args.get("input").cloned().unwrap_or(Value::Null) }))
    })
    .with_description("Delete the named notes")
    .with_policy(ToolPolicy::RequiresConfirmation);

    let ask_user = FnTool::external("ask_user").with_description("Ask the caller a question");

    Agent::new("assistant", EchoModel::new("echo"))
        .with_name("Assistant")
        .with_description("Echo agent with an automatic, a confirmed and an external tool")
        .with_instructions("Echo the user and use tools when asked to.")
        .with_tool(clock)
        .with_tool(delete_notes)
        .with_tool(ask_user)
        .with_storage(storage)
        .with_memory(memory)
}

fn team(storage: Arc<dyn SessionStore>) -> Team {
    let leader = Agent::new("coordinator", EchoModel::new("echo"))
        .with_instructions("Delegate writing tasks to the writer.");
    Team::new("writers-room", leader)
        .with_name("Writers Room")
        .with_description("A coordinator delegating to a writer")
        .with_member(writer())
        .with_storage(storage)
}

fn shout(storage: Arc<dyn SessionStore>) -> Workflow {
    let handler = FnHandler::new(|input: Value| async move {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| RunError::execution("shout needs a `message`"))?;
        Ok(json!(message.to_uppercase()))
    });
    Workflow::single_shot("shout", handler)
        .with_name("Shout")
        .with_description("Upper-cases a message in one go")
        .with_storage(storage)
}

fn pipeline(storage: Arc<dyn SessionStore>) -> Workflow {
    let count = FnHandler::new(|input: Value| async move {
        let text = input.as_str().unwrap_or_default();
        Ok(json!({ "words": text.split_whitespace().count() }))
    });
    Workflow::steps(
        "write-and-count",
        vec![
            WorkflowStep::agent(writer()),
            WorkflowStep::function("word-count", count),
        ],
    )
    .with_name("Write and count")
    .with_description("Streams the writer's output, then counts its words")
    .with_storage(storage)
}

/// Build the demo entities over `storage`.
pub async fn registry(storage: Arc<dyn SessionStore>) -> Result<EntityRegistry> {
    let memory = Arc::new(InMemoryUserMemory::new());
    memory
        .add(
            "demo",
            UserMemory::new("Prefers short answers", vec!["style".to_string()]),
        )
        .await;

    EntityRegistry::builder()
        .agent(assistant(storage.clone(), memory))
        .team(team(storage.clone()))
        .workflow(shout(storage.clone()))
        .workflow(pipeline(storage))
        .build()
}

//! Model seam and conversation messages
//!
//! A [`Model`] turns a conversation into a stream of text chunks and tool
//! calls. Backends plug in behind the trait; the engine never depends on a
//! particular provider.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use playground_core::{input_text, EventKind, RunEvent, ToolCall};

use crate::error::Result;
use crate::tool::ToolSpec;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A conversation message sent to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(MessageRole::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }
}

/// One increment of model output
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDelta {
    Text(String),
    ToolCall(ToolCall),
}

pub type ModelStream = BoxStream<'static, Result<ModelDelta>>;

#[async_trait]
pub trait Model: Send + Sync {
    /// Identifier shown in entity descriptors
    fn id(&self) -> &str;

    async fn respond(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelStream>;
}

/// Render a tool result the way it is fed back to a model.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rebuild the conversation of one run from its input and transcript.
pub fn transcript_messages(input: &Value, events: &[RunEvent]) -> Vec<Message> {
    let mut messages = vec![Message::user(
        input_text(input).unwrap_or_else(|| input.to_string()),
    )];
    let mut text = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();

    fn flush(messages: &mut Vec<Message>, text: &mut String, calls: &mut Vec<ToolCall>) {
        if !text.is_empty() || !calls.is_empty() {
            messages.push(Message::assistant(
                std::mem::take(text),
                std::mem::take(calls),
            ));
        }
    }

    for event in events {
        match &event.kind {
            EventKind::ContentDelta { content } => {
                if !calls.is_empty() {
                    flush(&mut messages, &mut text, &mut calls);
                }
                text.push_str(content);
            }
            EventKind::ToolCallProposed {
                tool_call_id,
                tool_name,
                arguments,
                ..
            } => calls.push(ToolCall::new(
                tool_call_id.clone(),
                tool_name.clone(),
                arguments.clone(),
            )),
            EventKind::ToolResult {
                tool_call_id,
                result,
                ..
            } => {
                flush(&mut messages, &mut text, &mut calls);
                messages.push(Message::tool(tool_call_id.clone(), render_value(result)));
            }
            _ => {}
        }
    }
    flush(&mut messages, &mut text, &mut calls);
    messages
}

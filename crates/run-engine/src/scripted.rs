//! Scripted model
//!
//! Replays a fixed sequence of responses, one per model call. Useful for
//! demos and for exercising entities without a model provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use playground_core::ToolCall;

use crate::error::{Result, RunError};
use crate::model::{Message, Model, ModelDelta, ModelStream};
use crate::tool::ToolSpec;

/// One scripted model turn
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Text streamed in the given chunks
    Text(Vec<String>),
    /// Optional text followed by tool calls
    ToolCalls(Vec<String>, Vec<ToolCall>),
    /// The model call fails
    Fail(String),
}

impl Turn {
    pub fn text(chunks: &[&str]) -> Self {
        Self::Text(chunks.iter().map(|c| c.to_string()).collect())
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::ToolCalls(Vec::new(), calls)
    }
}

pub struct ScriptedModel {
    id: String,
    turns: Mutex<VecDeque<Turn>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            id: id.into(),
            turns: Mutex::new(turns.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Conversations the model has been asked to respond to, in order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn respond(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<ModelStream> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let turn = self
            .turns
            .lock()
            .map_err(|_| RunError::execution("scripted model state poisoned"))?
            .pop_front()
            .ok_or_else(|| {
                RunError::execution(format!("{} has no scripted turns left", self.id))
            })?;

        let deltas: Vec<Result<ModelDelta>> = match turn {
            Turn::Text(chunks) => chunks.into_iter().map(|c| Ok(ModelDelta::Text(c))).collect(),
            Turn::ToolCalls(chunks, calls) => chunks
                .into_iter()
                .map(ModelDelta::Text)
                .chain(calls.into_iter().map(ModelDelta::ToolCall))
                .map(Ok)
                .collect(),
            Turn::Fail(message) => return Err(RunError::execution(message)),
        };
        Ok(Box::pin(stream::iter(deltas)))
    }
}

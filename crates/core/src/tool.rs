//! Tool calls, pending calls and the resolutions that resume a paused run

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// A tool invocation proposed by an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Pending,
    Resolved,
}

/// A tool call awaiting an external result or a confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    #[serde(flatten)]
    pub tool_call: ToolCall,
    pub state: ResolutionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ToolResolution>,
}

impl PendingToolCall {
    pub fn new(tool_call: ToolCall) -> Self {
        Self {
            tool_call,
            state: ResolutionState::Pending,
            resolution: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.tool_call.id
    }

    pub fn resolve(&mut self, resolution: ToolResolution) {
        self.state = ResolutionState::Resolved;
        self.resolution = Some(resolution);
    }
}

/// Caller-supplied outcome for one pending tool call
///
/// Either `result` carries a value produced outside the run, or `confirmed`
/// tells the entity whether it may execute the call itself. An explicit
/// `"result": null` is a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResolution {
    pub tool_call_id: String,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
}

impl ToolResolution {
    pub fn with_result(tool_call_id: impl Into<String>, result: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: Some(result),
            confirmed: None,
        }
    }

    pub fn confirmed(tool_call_id: impl Into<String>, confirmed: bool) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: None,
            confirmed: Some(confirmed),
        }
    }
}

fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Request to continue a paused run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub run_id: String,
    pub resolutions: Vec<ToolResolution>,
}

/// Check that `resolutions` resolve exactly the pending calls.
///
/// Every pending call must be resolved once; unknown, duplicate or empty
/// resolutions are rejected. Nothing is mutated.
pub fn validate_resolutions(
    pending: &[PendingToolCall],
    resolutions: &[ToolResolution],
) -> Result<()> {
    let pending_ids: HashSet<&str> = pending
        .iter()
        .filter(|p| p.state == ResolutionState::Pending)
        .map(|p| p.id())
        .collect();

    let mut seen = HashSet::new();
    for resolution in resolutions {
        let id = resolution.tool_call_id.as_str();
        if !pending_ids.contains(id) {
            return Err(Error::InvalidResume(format!(
                "Unknown tool call id: {}",
                id
            )));
        }
        if !seen.insert(id) {
            return Err(Error::InvalidResume(format!(
                "Tool call {} resolved more than once",
                id
            )));
        }
        if resolution.result.is_none() && resolution.confirmed.is_none() {
            return Err(Error::InvalidResume(format!(
                "Resolution for {} carries neither a result nor a confirmation",
                id
            )));
        }
    }

    let mut missing: Vec<&str> = pending_ids.difference(&seen).copied().collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(Error::InvalidResume(format!(
            "Missing resolutions for: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

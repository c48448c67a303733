//! Tool seam

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, RunError};

/// How a proposed call to a tool is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    /// Executed immediately by the entity
    Auto,
    /// Executed by the entity once the caller confirms it
    RequiresConfirmation,
    /// Executed by the caller, who supplies the result
    External,
}

/// Description of a tool handed to models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Identifies the run a tool is invoked from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub run_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    /// Round limit of the invoking run, inherited by sub-runs
    pub max_tool_rounds: usize,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the arguments
    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }

    fn policy(&self) -> ToolPolicy {
        ToolPolicy::Auto
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool backed by an async closure
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    policy: ToolPolicy,
    handler: ToolHandler,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: json!({ "type": "object" }),
            policy: ToolPolicy::Auto,
            handler: Arc::new(move |args| -> BoxFuture<'static, Result<Value>> {
                Box::pin(handler(args))
            }),
        }
    }

    /// A tool only the caller can execute.
    pub fn external(name: impl Into<String>) -> Self {
        let name = name.into();
        let label = name.clone();
        Self::new(name, move |_| {
            let label = label.clone();
            async move {
                Err(RunError::execution(format!(
                    "{} must be executed by the caller",
                    label
                )))
            }
        })
        .with_policy(ToolPolicy::External)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_policy(mut self, policy: ToolPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    fn policy(&self) -> ToolPolicy {
        self.policy
    }

    async fn call(&self, arguments: Value, _ctx: &ToolContext) -> Result<Value> {
        (self.handler)(arguments).await
    }
}

/// Tools available to an agent, keyed by name
#[derive(Clone, Default)]
pub struct Toolkit {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether a call must wait for the caller before it can complete
    pub fn requires_resolution(&self, name: &str) -> bool {
        self.get(name)
            .map_or(false, |tool| tool.policy() != ToolPolicy::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext {
            run_id: "r1".into(),
            session_id: "s1".into(),
            user_id: None,
            max_tool_rounds: 10,
        }
    }

    #[tokio::test]
    async fn test_fn_tool_calls_handler() {
        let tool = FnTool::new("add", |args: Value| async move {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        });
        assert_eq!(tool.call(json!({"a": 2, "b": 3}), &ctx()).await.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn test_external_tool_refuses_to_run() {
        let tool = FnTool::external("search");
        assert_eq!(tool.policy(), ToolPolicy::External);
        assert!(tool.call(json!({}), &ctx()).await.is_err());
    }

    #[test]
    fn test_toolkit_resolution_policy() {
        let mut toolkit = Toolkit::new();
        toolkit.insert(Arc::new(FnTool::new("clock", |_| async { Ok(json!("noon")) })));
        toolkit.insert(Arc::new(
            FnTool::new("send_email", |_| async { Ok(json!("sent")) })
                .with_policy(ToolPolicy::RequiresConfirmation),
        ));

        assert!(!toolkit.requires_resolution("clock"));
        assert!(toolkit.requires_resolution("send_email"));
        assert!(!toolkit.requires_resolution("unknown"));
        assert_eq!(toolkit.names(), vec!["clock", "send_email"]);
        assert_eq!(toolkit.specs().len(), 2);
    }
}

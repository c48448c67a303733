//! Run Engine - executes agents, teams and workflows as runs
//!
//! This crate turns an executable entity and an input into an ordered,
//! resumable stream of run events. Runs are persisted through the entity's
//! session store, can pause for tool resolutions and are resumed from their
//! stored transcript.

mod agent;
mod config;
mod dispatcher;
mod engine;
mod entity;
mod error;
mod model;
mod registry;
mod scripted;
mod team;
mod tool;
mod workflow;

pub use agent::Agent;
pub use config::EngineConfig;
pub use dispatcher::{ContinueRequest, Dispatcher, RunMode, RunOutcome, RunRequest};
pub use engine::{RunEngine, RunHandle, RunResponse, StartRun};
pub use entity::{Entity, EntityDescriptor, EntityStream, ReturnMode, RunContext};
pub use error::{Result, RunError};
pub use model::{
    render_value, transcript_messages, Message, MessageRole, Model, ModelDelta, ModelStream,
};
pub use registry::{EntityRegistry, RegistryBuilder};
pub use scripted::{ScriptedModel, Turn};
pub use team::{Team, DELEGATE_TOOL};
pub use tool::{FnTool, Tool, ToolContext, ToolPolicy, ToolSpec, Toolkit};
pub use workflow::{FnHandler, Workflow, WorkflowBody, WorkflowHandler, WorkflowStep};

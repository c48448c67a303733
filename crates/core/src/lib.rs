//! Core library for the agent playground
//!
//! This crate contains the data model shared by the engine and the server:
//! - Run events and the wire record
//! - Runs and their lifecycle
//! - Pending tool calls and resume validation
//! - Sessions and the session store contract

pub mod error;
pub mod event;
pub mod kind;
pub mod memory;
pub mod run;
pub mod session;
pub mod store;
pub mod tool;

pub use error::Error;
pub use event::{EventKind, RunEvent};
pub use kind::EntityKind;
pub use memory::{InMemoryUserMemory, UserMemory, UserMemoryStore};
pub use run::{input_text, Run, RunStatus, RunSummary};
pub use session::{RunView, Session, SessionMetadata, SessionSummary, SessionView};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use tool::{
    validate_resolutions, PendingToolCall, ResolutionState, ResumeRequest, ToolCall,
    ToolResolution,
};

pub type Result<T> = std::result::Result<T, Error>;

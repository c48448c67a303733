//! Error types for the core library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid resume: {0}")]
    InvalidResume(String),

    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session {session_id} belongs to {owner}, not {entity_id}")]
    SessionConflict {
        session_id: String,
        owner: String,
        entity_id: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

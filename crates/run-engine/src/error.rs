//! Error types for run-engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors surfaced to callers of the engine and dispatcher
///
/// Failures inside a running entity never surface here; they are recorded
/// as the run's terminal `error` event instead.
#[derive(Debug, Error)]
pub enum RunError {
    /// No entity registered under the id
    #[error("Entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    /// Session missing or not owned by the entity
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Run missing from the session store
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Entity has no session store configured
    #[error("{entity_id} does not have storage enabled")]
    StorageUnavailable { entity_id: String },

    /// Entity has no user memory configured
    #[error("{entity_id} does not have memory enabled")]
    MemoryUnavailable { entity_id: String },

    /// Resume request rejected
    #[error("Invalid resume: {message}")]
    InvalidResume { message: String },

    /// Entity failure while producing events
    #[error("Execution failed: {message}")]
    Execution { message: String },

    /// Input shape the entity cannot accept
    #[error("Unsupported input: {message}")]
    UnsupportedInput { message: String },

    /// Session is owned by another entity
    #[error("Session {session_id} belongs to another entity")]
    SessionConflict { session_id: String },

    /// Registry or engine misconfiguration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Session store failure
    #[error("Store error: {0}")]
    Store(playground_core::Error),
}

impl RunError {
    /// Create an Execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create an UnsupportedInput error
    pub fn unsupported_input(message: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            message: message.into(),
        }
    }

    /// Create an InvalidResume error
    pub fn invalid_resume(message: impl Into<String>) -> Self {
        Self::InvalidResume {
            message: message.into(),
        }
    }

    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound { .. } => "entity-not-found",
            Self::SessionNotFound { .. } => "session-not-found",
            Self::RunNotFound { .. } => "run-not-found",
            Self::StorageUnavailable { .. } => "storage-unavailable",
            Self::MemoryUnavailable { .. } => "memory-unavailable",
            Self::InvalidResume { .. } => "invalid-resume",
            Self::Execution { .. } => "execution-error",
            Self::UnsupportedInput { .. } => "unsupported-input",
            Self::SessionConflict { .. } => "session-conflict",
            Self::Configuration { .. } => "configuration-error",
            Self::Store(_) => "storage-error",
        }
    }
}

impl From<playground_core::Error> for RunError {
    fn from(err: playground_core::Error) -> Self {
        use playground_core::Error as CoreError;
        match err {
            CoreError::SessionNotFound(session_id) => Self::SessionNotFound { session_id },
            CoreError::RunNotFound(run_id) => Self::RunNotFound { run_id },
            CoreError::InvalidResume(message) => Self::InvalidResume { message },
            CoreError::SessionConflict { session_id, .. } => Self::SessionConflict { session_id },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_onto_taxonomy() {
        let err: RunError = playground_core::Error::InvalidResume("missing t1".into()).into();
        assert_eq!(err.code(), "invalid-resume");

        let err: RunError = playground_core::Error::SessionNotFound("s1".into()).into();
        assert_eq!(err.code(), "session-not-found");

        let err: RunError = playground_core::Error::Storage("disk full".into()).into();
        assert_eq!(err.code(), "storage-error");
    }
}

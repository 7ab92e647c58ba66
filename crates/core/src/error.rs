//! Error types for Conductor.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! document authoring errors (found while parsing a workflow document) and
//! runtime errors (raised while dispatching steps to agents).

use thiserror::Error;

/// Unified error type for Conductor.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// Authoring errors abort before any step is dispatched; runtime errors are
/// recorded against the step that raised them.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Front-matter block is unterminated or not valid YAML
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// A placeholder has no caller value and no default
    #[error("Unresolved placeholder: ${token} has no value and no default")]
    UnresolvedPlaceholder { token: String },

    /// The same placeholder declares conflicting defaults
    #[error("Ambiguous placeholder: ${token} declares conflicting defaults '{first}' and '{second}'")]
    AmbiguousPlaceholder {
        token: String,
        first: String,
        second: String,
    },

    /// A context annotation names a step or phase that does not exist
    #[error("Step {step}: context references '{reference}', which does not exist")]
    DanglingContextReference { step: String, reference: String },

    /// A context annotation names the step itself or something after it
    #[error("Step {step}: context references '{reference}', which does not precede it")]
    ForwardReference { step: String, reference: String },

    /// Two steps share the same label
    #[error("Duplicate step label: {step}")]
    DuplicateStep { step: String },

    /// A step dispatch exceeded its time budget
    #[error("Step {step} timed out after {timeout_secs}s")]
    DispatchTimeout { step: String, timeout_secs: u64 },

    /// The agent collaborator reported a failure
    #[error("Agent '{role}' failed: {message}")]
    AgentInvocation { role: String, message: String },

    /// Agent backend errors (transport, protocol)
    #[error("Agent error: {0}")]
    Agent(String),

    /// Document loading and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Orchestration errors
    #[error("Orchestration error: {0}")]
    Orchestration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Errors in the source document itself. Fatal before any dispatch.
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            AppError::MalformedMetadata(_)
                | AppError::UnresolvedPlaceholder { .. }
                | AppError::AmbiguousPlaceholder { .. }
                | AppError::DanglingContextReference { .. }
                | AppError::ForwardReference { .. }
                | AppError::DuplicateStep { .. }
        )
    }

    /// Errors scoped to a single step dispatch.
    pub fn is_runtime_error(&self) -> bool {
        matches!(
            self,
            AppError::DispatchTimeout { .. } | AppError::AgentInvocation { .. } | AppError::Agent(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

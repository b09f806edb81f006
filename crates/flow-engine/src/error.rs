//! Error types for the flow engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the flow engine
///
/// Apart from `Validation`, these are programmer errors: a caller passed an
/// id that does not exist or bypassed the validated API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Module id does not resolve in the current space
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Connection id does not resolve in the current space
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// A module with this id already exists
    #[error("Duplicate module id: {0}")]
    DuplicateModuleId(String),

    /// The scheduler could not order every module
    #[error("GRAPH_CYCLE: modules could not be scheduled: {}", unscheduled.join(", "))]
    GraphCycle { unscheduled: Vec<String> },

    /// A structural invariant of the space does not hold
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A proposed connection was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Module execution failed outside the engine
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl EngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an invariant violation error with a message
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

/// The seven reasons a proposed connection can be rejected
///
/// Variants are listed in the order the validator checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    ModuleNotFound,
    ModuleNotDone,
    EmptyOutput,
    PortNotFound,
    TypeMismatch,
    ModuleRunning,
    CircularDependency,
}

impl ValidationErrorKind {
    /// Wire code of this error, e.g. `MODULE_NOT_DONE`
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleNotFound => "MODULE_NOT_FOUND",
            Self::ModuleNotDone => "MODULE_NOT_DONE",
            Self::EmptyOutput => "EMPTY_OUTPUT",
            Self::PortNotFound => "PORT_NOT_FOUND",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::ModuleRunning => "MODULE_RUNNING",
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
        }
    }
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A rejected connection proposal, rendered to the user by the UI
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

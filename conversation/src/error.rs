//! Error taxonomy for the conversation engine.
//!
//! Reply errors are always recoverable through the retry policy and, once
//! retries are exhausted, degrade into an in-transcript error reply. Only
//! configuration problems and run-level failures surface to the caller.
//!
//! | Error                 | Recovered by                | Surfaces as            |
//! |-----------------------|-----------------------------|------------------------|
//! | `ReplyError::Parse`   | retry policy                | error reply            |
//! | `ReplyError::Schema`  | retry policy                | error reply            |
//! | `ReplyError::Transport` | retry policy (+ fallback) | error reply            |
//! | `ToolExecutionError`  | per tool call               | error entry in results |
//! | `ConfigurationError`  | n/a                         | fatal before turn 1    |
//! | `RunError`            | n/a                         | `success = false`      |

use std::fmt;

use thiserror::Error;

use crate::protocol::Role;

/// Classification used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Raw text held no extractable JSON object.
    ParseFailure,
    /// JSON was found but violated the reply schema.
    SchemaFailure,
    /// The backend call itself failed (network, auth, rate limit).
    Transient,
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::SchemaFailure => write!(f, "schema_failure"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// Failure to obtain a valid reply from one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// No JSON object could be extracted from the raw text.
    #[error("JSON parse failed: {reason}. Raw response: {excerpt}...")]
    Parse { reason: String, excerpt: String },

    /// Extracted JSON failed structural, enum or length validation.
    #[error("schema validation failed: {message}")]
    Schema { message: String },

    /// The backend call failed before any text was produced.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ReplyError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Parse { .. } => RetryCategory::ParseFailure,
            Self::Schema { .. } => RetryCategory::SchemaFailure,
            Self::Transport(_) => RetryCategory::Transient,
        }
    }
}

/// A single tool call failed. Recorded in the turn, never aborts it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tool `{tool}` failed: {message}")]
pub struct ToolExecutionError {
    pub tool: String,
    pub message: String,
}

impl ToolExecutionError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Invalid run configuration. Fatal: the run never starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Unrecoverable failure inside the orchestrator loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// The state machine selected a role nobody plays.
    #[error("no provider is assigned to role `{0}`")]
    UnassignedRole(Role),

    /// A provider is assigned but has no agent registered.
    #[error("no agent registered for provider `{0}`")]
    MissingAgent(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

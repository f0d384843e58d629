//! Error taxonomy for the builder core.
//!
//! Every failure is a typed value: the backend client and the tree never
//! panic or terminate the process, and the orchestrator converts whatever
//! bubbles up into a user-visible chat message.

use thiserror::Error;

/// Failures from the generation backend client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Malformed caller input or an unusable backend reply. Recoverable
    /// locally; the caller corrects the input and tries again.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Backend unreachable, refused, or timed out, including after the
    /// retry budget is spent.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The named model is absent from the backend's catalog.
    #[error("model error: {0}")]
    Model(String),
}

impl BackendError {
    /// User-facing suggestion shown next to the failure.
    pub fn remedy(&self) -> &'static str {
        match self {
            BackendError::Validation(_) => "Adjust the request and try again.",
            BackendError::Connection(_) => {
                "Make sure the generation backend is running and reachable."
            }
            BackendError::Model(_) => "Pull the model on the backend and try again.",
        }
    }
}

/// Structural failures from the project file tree. Always caller-correctable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("a file or folder named \"{0}\" already exists here")]
    DuplicateName(String),

    #[error("\"{0}\" is not a folder")]
    NotAFolder(String),

    #[error("no file or folder at \"{0}\"")]
    PathNotFound(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}

//! Error types for the graph cache

use thiserror::Error;

use crate::query::ParseError;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// Payload shape does not match the query or the previously cached shape.
    #[error("Invalid payload at {path}: {message}")]
    InvalidPayload { path: String, message: String },

    #[error("Missing value for variable ${0}")]
    MissingVariable(String),

    #[error("Fragment not found: {0}")]
    FragmentNotFound(String),

    #[error("Document contains {0} fragments; a fragment name is required")]
    AmbiguousFragment(usize),

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub(crate) fn invalid_payload(path: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::InvalidPayload {
            path: path.into(),
            message: message.into(),
        }
    }
}

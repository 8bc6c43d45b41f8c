//! Error types for apirun

use thiserror::Error;

/// Result type alias using apirun Error
pub type Result<T> = std::result::Result<T, Error>;

/// apirun error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("{service} is not available: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    #[error("{service} failed: {message}")]
    Upstream {
        service: String,
        /// HTTP status reported by the collaborator, when it has one
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>, reason: impl ToString) -> Self {
        Error::UpstreamUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn upstream(service: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Upstream {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Short label for the component an error originated from.
    pub fn source_label(&self) -> &str {
        match self {
            Error::NotFound { .. } | Error::Io(_) => "filesystem",
            Error::UpstreamUnavailable { .. } => "connection",
            Error::Upstream { service, .. } => service,
            Error::InvalidRequest(_) => "request",
            Error::Serialization(_) | Error::Internal(_) => "backend",
        }
    }
}

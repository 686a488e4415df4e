use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error types shared across the workspace.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown storage system type: {0}")]
    UnknownSystemType(String),

    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new UnknownSystemType error
    pub fn unknown_system_type(system_type: impl Into<String>) -> Self {
        Self::UnknownSystemType(system_type.into())
    }

    /// Create a new InvalidCapacity error
    pub fn invalid_capacity(message: impl Into<String>) -> Self {
        Self::InvalidCapacity(message.into())
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownSystemType(_) | Self::InvalidCapacity(_) | Self::Json(_) | Self::Url(_)
        )
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// The wire body for every proxy-originated error response.
///
/// All error paths in the mediator serialize to this shape so clients see
/// one uniform contract:
///
/// ```json
/// {"errorCode": 507, "httpStatusCode": 507, "message": "request denied"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: u16,
    pub http_status_code: u16,
    pub message: String,
}

impl ErrorBody {
    /// Creates an error body whose `errorCode` mirrors the HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            error_code: status,
            http_status_code: status,
            message: message.into(),
        }
    }
}

//! Proxy-originated error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use storgate_core::ErrorBody;
use storgate_ledger::LedgerError;
use storgate_policy::PolicyError;
use storgate_token::TokenError;
use storgate_vendor::VendorError;

/// Every error the mediator can answer with.
///
/// All variants serialize to the wire error body
/// `{errorCode, httpStatusCode, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request (missing bearer scheme, bad body, …).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Authentication failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The tenant is denied.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// URL authorization denied; deliberately non-informative.
    #[error("Not found")]
    NotFound,

    /// Quota approval returned false.
    #[error("request denied")]
    InsufficientStorage,

    /// The decision engine was unreachable or unusable.
    #[error("Policy engine unavailable: {0}")]
    PolicyUnavailable(String),

    /// The array or its adapter failed before the forward.
    #[error("Storage system unavailable: {0}")]
    BadGateway(String),

    /// The quota ledger failed; the request was not forwarded.
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::BadGateway(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            Self::PolicyUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::LedgerUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-visible message. Denials stay terse by design.
    fn message(&self) -> String {
        match self {
            Self::NotFound => "request denied".to_string(),
            Self::InsufficientStorage => "request denied".to_string(),
            Self::PolicyUnavailable(_) | Self::LedgerUnavailable(_) | Self::Internal(_) => {
                // Internal details belong in logs, not responses.
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        let body = ErrorBody::from_status(status.as_u16(), self.message());
        (status, Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::AccessNotExpired => Self::BadRequest(err.to_string()),
            TokenError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            TokenError::Store(store) => Self::Internal(store.to_string()),
            TokenError::Encoding { .. } => Self::Internal(err.to_string()),
            // Malformed, Expired, InvalidSignature, WrongAlgorithm, Unauthorized
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        Self::PolicyUnavailable(err.to_string())
    }
}

impl From<VendorError> for ApiError {
    fn from(err: VendorError) -> Self {
        Self::BadGateway(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::LedgerUnavailable(err.to_string())
    }
}

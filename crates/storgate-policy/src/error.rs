/// Errors from the policy decision engine.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The engine could not be reached or timed out.
    #[error("Policy engine unavailable: {message}")]
    Unavailable {
        /// Description of the transport failure.
        message: String,
    },

    /// The engine replied but the payload did not decode.
    #[error("Malformed policy response: {message}")]
    Malformed {
        /// Description of the decode failure.
        message: String,
    },

    /// The engine replied without a `result` member (OPA "undefined") —
    /// the queried policy document does not exist or produced no value.
    #[error("Policy produced no result")]
    Undefined,
}

impl PolicyError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for PolicyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else if err.is_timeout() {
            Self::unavailable(format!("decision request timed out: {err}"))
        } else {
            Self::unavailable(err.to_string())
        }
    }
}

/// Convenience result type for policy operations.
pub type PolicyResult<T> = std::result::Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert!(
            PolicyError::unavailable("connection refused")
                .to_string()
                .contains("unavailable")
        );
        assert_eq!(
            PolicyError::Undefined.to_string(),
            "Policy produced no result"
        );
    }
}

use storgate_store::StoreError;

/// Errors that can occur while minting, validating, or refreshing tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token could not be parsed at all.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the parse failure.
        message: String,
    },

    /// The token's `exp` is in the past.
    #[error("Token expired")]
    Expired,

    /// The signature does not verify against the shared secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token header names an algorithm other than HS256.
    #[error("Unsupported signing algorithm")]
    WrongAlgorithm,

    /// A still-valid access token was presented for refresh.
    #[error("access token was valid")]
    AccessNotExpired,

    /// The refresh exchange failed authentication.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the exchange is unauthorized.
        message: String,
    },

    /// The subject's group is on the deny list.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why the exchange is forbidden.
        message: String,
    },

    /// Signing a token failed.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
    },

    /// The shared store was unreachable or refused the operation.
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

impl TokenError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the token itself (parse, signature,
    /// expiry, algorithm) as opposed to exchange or store failures.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::Expired | Self::InvalidSignature | Self::WrongAlgorithm
        )
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::WrongAlgorithm,
            _ => Self::malformed(err.to_string()),
        }
    }
}

/// Convenience result type for token operations.
pub type TokenResult<T> = std::result::Result<T, TokenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TokenError::Expired.to_string(), "Token expired");
        assert_eq!(
            TokenError::AccessNotExpired.to_string(),
            "access token was valid"
        );
        assert_eq!(
            TokenError::unauthorized("bad sha").to_string(),
            "Unauthorized: bad sha"
        );
    }

    #[test]
    fn test_validation_predicate() {
        assert!(TokenError::Expired.is_validation_error());
        assert!(TokenError::WrongAlgorithm.is_validation_error());
        assert!(!TokenError::AccessNotExpired.is_validation_error());
        assert!(!TokenError::forbidden("denied").is_validation_error());
    }
}

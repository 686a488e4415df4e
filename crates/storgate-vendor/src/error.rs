/// Errors from vendor adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    /// The array rejected or failed the login.
    #[error("Login to system {system_id} failed: {message}")]
    Login {
        /// The array's system id.
        system_id: String,
        /// Description of the failure.
        message: String,
    },

    /// A referenced object does not exist on the array.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Object kind, e.g. `volume` or `storage pool`.
        kind: String,
        /// The id or name that failed to resolve.
        id: String,
    },

    /// The array could not be reached or the request failed in transit.
    #[error("Array request failed: {message}")]
    Request {
        /// Description of the transport failure.
        message: String,
    },

    /// The array replied with a payload that did not decode.
    #[error("Unexpected array response: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },
}

impl VendorError {
    /// Creates a new `Login` error.
    #[must_use]
    pub fn login(system_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Login {
            system_id: system_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `Request` error.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err.to_string())
        } else {
            Self::request(err.to_string())
        }
    }
}

/// Convenience result type for vendor operations.
pub type VendorResult<T> = std::result::Result<T, VendorError>;

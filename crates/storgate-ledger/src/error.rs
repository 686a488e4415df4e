use storgate_store::StoreError;

/// Errors from ledger operations.
///
/// Any of these reaching the mediator means the request must not be
/// forwarded; they surface as HTTP 500.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The shared store was unreachable or refused the operation.
    #[error("Ledger store error: {0}")]
    Store(#[from] StoreError),

    /// A stored record did not decode.
    #[error("Corrupt ledger record at {key}: {message}")]
    Corrupt {
        /// The store key holding the bad record.
        key: String,
        /// Description of the decode failure.
        message: String,
    },

    /// The compare-and-swap retry budget was exhausted.
    #[error("Ledger contention on {key}")]
    Contention {
        /// The entry key the operation kept losing races on.
        key: String,
    },
}

impl LedgerError {
    /// Creates a new `Corrupt` error.
    #[must_use]
    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Contention` error.
    #[must_use]
    pub fn contention(key: impl Into<String>) -> Self {
        Self::Contention { key: key.into() }
    }
}

/// Convenience result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

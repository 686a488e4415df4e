//! Shared key-value store interface for cross-replica proxy state.
//!
//! Refresh records, the deny list, ledger entries, and usage counters all
//! live behind the [`KvStore`] trait. Two backends are provided:
//!
//! - [`MemoryKvStore`] — a single-process map, used by tests and
//!   single-replica deployments.
//! - [`RedisKvStore`] — the production backend over a deadpool-managed
//!   Redis pool, implementing the multi-key compare-and-swap with
//!   `WATCH`/`MULTI`/`EXEC`.
//!
//! # Atomicity contract
//!
//! [`KvStore::compare_and_swap`] is the only mutation primitive the quota
//! ledger uses: it applies a batch of writes iff every guarded key still
//! holds the value the caller observed. Callers wrap it in a bounded retry
//! loop; a `false` return means "re-read and try again", never corruption.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryKvStore;
pub use redis_store::RedisKvStore;

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// A command failed after the connection was established.
    #[error("Store operation failed: {message}")]
    Operation { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_io_error() || err.is_timeout() {
            Self::unavailable(err.to_string())
        } else {
            Self::operation(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::unavailable(err.to_string())
    }
}

/// Convenience result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An observed key state that must still hold for a transaction to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGuard {
    pub key: String,
    /// `None` guards the key's absence.
    pub expected: Option<String>,
}

impl KeyGuard {
    pub fn new(key: impl Into<String>, expected: Option<String>) -> Self {
        Self {
            key: key.into(),
            expected,
        }
    }
}

/// A write applied when a transaction's guards hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWrite {
    pub key: String,
    /// `None` deletes the key.
    pub value: Option<String>,
}

impl KeyWrite {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// The shared key-value store every replica of the proxy points at.
///
/// String values only; callers serialize their records as JSON. Set
/// operations back the deny list (`tenant:deny`).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a key. `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally writes a key.
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Applies `writes` atomically iff every guard in `guards` still holds.
    ///
    /// Returns `true` when the writes were applied, `false` when any guard
    /// no longer matched (the caller should re-read and retry).
    async fn compare_and_swap(&self, guards: &[KeyGuard], writes: &[KeyWrite])
    -> StoreResult<bool>;

    /// Lists keys beginning with `prefix`. Used by the fencing sweeper; not
    /// on any request path.
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Adds a member to a set; `true` if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Removes a member from a set; `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Membership test against a set key.
    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Lists a set's members.
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_and_write_constructors() {
        let guard = KeyGuard::new("k", Some("v".to_string()));
        assert_eq!(guard.key, "k");
        assert_eq!(guard.expected.as_deref(), Some("v"));

        let write = KeyWrite::set("k", "v2");
        assert_eq!(write.value.as_deref(), Some("v2"));
        assert_eq!(KeyWrite::delete("k").value, None);
    }

    #[test]
    fn test_store_error_classification() {
        let err = StoreError::unavailable("refused");
        assert!(err.to_string().contains("unavailable"));
        let err = StoreError::operation("WRONGTYPE");
        assert!(err.to_string().contains("WRONGTYPE"));
    }
}

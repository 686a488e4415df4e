//! Read-mostly configuration store view.
//!
//! The administrative services write two JSON documents — registered
//! storage systems and the roles document — which land on this proxy as
//! mounted files. This crate loads them into an `ArcSwap` snapshot, watches
//! them for changes, validates before swapping, and exposes tenant/deny
//! state read through the shared key-value store. Subscribers get a
//! generation bump on every successful reload and use it to invalidate
//! derived caches.

pub mod documents;
pub mod store;
pub mod watcher;

use thiserror::Error;

pub use documents::{PoolQuotas, RoleSpec, RolesDocument, StorageDocument, SystemRoles};
pub use store::{ConfigStore, FileConfigStore};
pub use watcher::start_watcher;

/// Error types for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Store error: {0}")]
    Store(#[from] storgate_store::StoreError),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

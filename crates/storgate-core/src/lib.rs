//! Shared data model for the storgate proxy.
//!
//! This crate holds the types every other crate in the workspace speaks:
//! the error taxonomy and wire error body, storage system identities, the
//! role and quota data model, and request correlation ids. It has no I/O.

pub mod correlation;
pub mod error;
pub mod quota;
pub mod storage;
pub mod system;

pub use correlation::CorrelationId;
pub use error::{CoreError, ErrorBody, Result};
pub use quota::{QuotaRequest, RoleKey, parse_capacity_kb};
pub use storage::StorageSystem;
pub use system::SystemType;

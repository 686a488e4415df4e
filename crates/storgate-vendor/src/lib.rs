//! Vendor adapters for the backend storage arrays.
//!
//! Each array family implements the same capability set behind the
//! [`VendorClient`] trait: log in for a session credential, resolve
//! volume and pool names from opaque ids, and validate that a pool exists.
//! Adapters share no state with each other; the only cross-request state is
//! the per-system [`SessionCache`].

pub mod client;
pub mod error;
pub mod powerflex;
pub mod powermax;
pub mod powerscale;
pub mod session;

pub use client::{VendorClient, VolumeInfo, build_client};
pub use error::{VendorError, VendorResult};
pub use powerflex::PowerFlexClient;
pub use powermax::PowerMaxClient;
pub use powerscale::PowerScaleClient;
pub use session::{SessionCache, SessionCredential};

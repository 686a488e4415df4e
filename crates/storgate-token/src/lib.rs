//! Tenant token authority.
//!
//! Mints, validates, and refreshes the HS256-signed tenant tokens the
//! mediator authenticates with. Access tokens live minutes, refresh tokens
//! days; only a SHA-256 fingerprint of each refresh token is ever stored.
//!
//! The algorithm is pinned: tokens signed with anything other than HS256
//! (including the `alg: none` downgrade) fail validation outright.

pub mod authority;
pub mod claims;
pub mod error;
pub mod record;

pub use authority::{TokenAuthority, TokenConfig, TokenPair};
pub use claims::Claims;
pub use error::{TokenError, TokenResult};
pub use record::{DENY_LIST_KEY, RefreshRecord, tenant_key};

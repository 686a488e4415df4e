use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The claim set carried by both access and refresh tokens.
///
/// `group` identifies the tenant; `role` names the role bundle the tenant
/// provisioned under. Both survive refresh unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: String,

    /// Subject (the tenant group, duplicated for JWT-standard tooling).
    pub sub: String,

    /// Expiration time (Unix seconds). `exp < now` is the sole expiry rule.
    pub exp: i64,

    /// Issued at (Unix seconds).
    pub iat: i64,

    /// Role the tenant was registered with.
    pub role: String,

    /// Tenant group.
    pub group: String,
}

impl Claims {
    /// Whether the claim set has expired as of `now` (Unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp < now
    }

    /// Whether the claim set has expired as of the current wall clock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc().unix_timestamp())
    }
}

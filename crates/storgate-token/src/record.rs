use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The deny-list set key. Membership denies refresh and mediation alike.
pub const DENY_LIST_KEY: &str = "tenant:deny";

/// Store key for a tenant's refresh record.
pub fn tenant_key(group: &str) -> String {
    format!("tenant:{group}")
}

/// Per-tenant refresh state in the shared store.
///
/// Only the SHA-256 of the refresh token is retained; the raw token never
/// re-enters the system after minting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    /// base64(SHA-256(refresh token)).
    pub refresh_sha: String,

    /// Unix seconds the refresh token was issued.
    pub refresh_issued_at: i64,

    /// Number of access tokens exchanged against this refresh token.
    pub refresh_count: u64,
}

impl RefreshRecord {
    /// Builds the record for a freshly minted refresh token.
    pub fn new(refresh_token: &str, issued_at: i64) -> Self {
        Self {
            refresh_sha: fingerprint(refresh_token),
            refresh_issued_at: issued_at,
            refresh_count: 0,
        }
    }

    /// Whether `refresh_token` is the one this record was minted for.
    #[must_use]
    pub fn matches(&self, refresh_token: &str) -> bool {
        self.refresh_sha == fingerprint(refresh_token)
    }
}

/// base64(SHA-256(token)) — the only form a refresh token is stored in.
pub fn fingerprint(token: &str) -> String {
    STANDARD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_key() {
        assert_eq!(tenant_key("alice"), "tenant:alice");
    }

    #[test]
    fn test_fingerprint_is_stable_and_discriminating() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        // 32 bytes of SHA-256, base64-encoded with padding.
        assert_eq!(fingerprint("abc").len(), 44);
    }

    #[test]
    fn test_record_matches_only_own_token() {
        let record = RefreshRecord::new("refresh-token", 1000);
        assert!(record.matches("refresh-token"));
        assert!(!record.matches("other-token"));
        assert_eq!(record.refresh_count, 0);
    }

    #[test]
    fn test_record_serde_field_names() {
        let record = RefreshRecord::new("t", 7);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("refresh_sha").is_some());
        assert!(json.get("refresh_issued_at").is_some());
        assert!(json.get("refresh_count").is_some());
    }
}

//! Token minting, validation, and the refresh exchange.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};

use storgate_store::{KeyGuard, KeyWrite, KvStore, StoreError};

use crate::claims::Claims;
use crate::error::{TokenError, TokenResult};
use crate::record::{DENY_LIST_KEY, RefreshRecord, tenant_key};

/// Bound on compare-and-swap retries against the refresh record.
const MAX_CAS_RETRIES: usize = 8;

/// Tunables for minted tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// `iss` claim stamped on every token.
    pub issuer: String,

    /// `aud` claim stamped on every token.
    pub audience: String,

    /// Access token lifetime.
    pub access_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "storgate".to_string(),
            audience: "storgate".to_string(),
            access_lifetime: Duration::minutes(5),
            refresh_lifetime: Duration::days(30),
        }
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Mints, validates, and refreshes tenant tokens.
///
/// Everything is HS256 against one shared secret; the secret is loaded from
/// a mounted file at startup and never appears in configuration structs or
/// logs. Refresh state lives in the shared store under `tenant:<group>`.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    config: TokenConfig,
    store: Arc<dyn KvStore>,
}

impl TokenAuthority {
    pub fn new(secret: &[u8], config: TokenConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            config,
            store,
        }
    }

    /// Signs a claim set with HS256.
    pub fn sign(&self, claims: &Claims) -> TokenResult<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::encoding(e.to_string()))
    }

    /// Mints an access/refresh pair for a tenant and persists the refresh
    /// fingerprint.
    ///
    /// The stored [`RefreshRecord`] starts at `refresh_count` 0 and replaces
    /// any previous record for the group: minting invalidates outstanding
    /// refresh tokens.
    pub async fn mint(&self, group: &str, role: &str) -> TokenResult<TokenPair> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let access = self.sign(&self.claims_for(group, role, now, self.config.access_lifetime))?;
        let refresh = self.sign(&self.claims_for(group, role, now, self.config.refresh_lifetime))?;

        let key = tenant_key(group);
        let record = serde_json::to_string(&RefreshRecord::new(&refresh, now))
            .map_err(|e| TokenError::encoding(e.to_string()))?;

        for _ in 0..MAX_CAS_RETRIES {
            let current = self.store.get(&key).await?;
            let applied = self
                .store
                .compare_and_swap(
                    &[KeyGuard::new(&key, current)],
                    &[KeyWrite::set(&key, &record)],
                )
                .await?;
            if applied {
                tracing::debug!(group = %group, role = %role, "minted token pair");
                return Ok(TokenPair { access, refresh });
            }
        }

        Err(TokenError::Store(StoreError::operation(
            "refresh record contention during mint",
        )))
    }

    /// Validates an access token and returns its claims.
    ///
    /// Rejects non-HS256 headers before signature verification; `exp < now`
    /// with zero leeway is the sole expiry rule.
    pub fn validate(&self, token: &str) -> TokenResult<Claims> {
        self.decode(token, true)
    }

    /// Exchanges an expired access token and a live refresh token for a new
    /// access token.
    ///
    /// The contract, in order:
    /// 1. the refresh token must parse, verify, and be unexpired;
    /// 2. the group must not be on the deny list;
    /// 3. the access token must be expired — a still-valid access token is
    ///    a [`TokenError::AccessNotExpired`], any failure other than expiry
    ///    is `Unauthorized`;
    /// 4. the refresh fingerprint must match the stored record, whose
    ///    `refresh_count` is incremented atomically;
    /// 5. the new access token preserves group and role with a fresh expiry.
    pub async fn refresh(&self, expired_access: &str, refresh_token: &str) -> TokenResult<String> {
        let refresh_claims = self.decode(refresh_token, true).map_err(|e| match e {
            TokenError::Store(store) => TokenError::Store(store),
            other => TokenError::unauthorized(format!("invalid refresh token: {other}")),
        })?;

        if self.is_denied(&refresh_claims.group).await? {
            tracing::warn!(group = %refresh_claims.group, "refresh denied: group on deny list");
            return Err(TokenError::forbidden("tenant is denied"));
        }

        let access_claims = match self.decode(expired_access, true) {
            Ok(_) => return Err(TokenError::AccessNotExpired),
            Err(TokenError::Expired) => self.decode(expired_access, false)?,
            Err(TokenError::Store(store)) => return Err(TokenError::Store(store)),
            Err(other) => {
                return Err(TokenError::unauthorized(format!(
                    "invalid access token: {other}"
                )));
            }
        };

        if access_claims.group != refresh_claims.group {
            return Err(TokenError::unauthorized(
                "access and refresh tokens belong to different tenants",
            ));
        }

        self.increment_refresh_count(&access_claims.group, refresh_token)
            .await?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let new_access = self.sign(&self.claims_for(
            &access_claims.group,
            &access_claims.role,
            now,
            self.config.access_lifetime,
        ))?;

        tracing::debug!(group = %access_claims.group, "refreshed access token");
        Ok(new_access)
    }

    /// Whether `group` is on the deny list.
    pub async fn is_denied(&self, group: &str) -> TokenResult<bool> {
        Ok(self.store.set_contains(DENY_LIST_KEY, group).await?)
    }

    fn claims_for(&self, group: &str, role: &str, now: i64, lifetime: Duration) -> Claims {
        Claims {
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            sub: group.to_string(),
            exp: now + lifetime.whole_seconds(),
            iat: now,
            role: role.to_string(),
            group: group.to_string(),
        }
    }

    fn decode(&self, token: &str, validate_exp: bool) -> TokenResult<Claims> {
        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::WrongAlgorithm);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    async fn increment_refresh_count(&self, group: &str, refresh_token: &str) -> TokenResult<()> {
        let key = tenant_key(group);

        for _ in 0..MAX_CAS_RETRIES {
            let raw = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| TokenError::unauthorized("no refresh record for tenant"))?;

            let mut record: RefreshRecord = serde_json::from_str(&raw)
                .map_err(|_| TokenError::unauthorized("corrupt refresh record"))?;

            if !record.matches(refresh_token) {
                return Err(TokenError::unauthorized(
                    "refresh token does not match issued token",
                ));
            }

            record.refresh_count += 1;
            let updated = serde_json::to_string(&record)
                .map_err(|e| TokenError::encoding(e.to_string()))?;

            let applied = self
                .store
                .compare_and_swap(
                    &[KeyGuard::new(&key, Some(raw))],
                    &[KeyWrite::set(&key, updated)],
                )
                .await?;
            if applied {
                return Ok(());
            }
        }

        Err(TokenError::Store(StoreError::operation(
            "refresh record contention",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storgate_store::MemoryKvStore;

    const SECRET: &[u8] = b"unit-test-secret";

    fn authority(store: Arc<dyn KvStore>) -> TokenAuthority {
        TokenAuthority::new(SECRET, TokenConfig::default(), store)
    }

    fn expired_access(authority: &TokenAuthority, group: &str, role: &str) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        authority
            .sign(&Claims {
                iss: "storgate".to_string(),
                aud: "storgate".to_string(),
                sub: group.to_string(),
                exp: now - 60,
                iat: now - 360,
                role: role.to_string(),
                group: group.to_string(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_mint_validate_round_trip() {
        let store = Arc::new(MemoryKvStore::new());
        let authority = authority(store.clone());

        let pair = authority.mint("alice", "bronze").await.unwrap();
        let claims = authority.validate(&pair.access).unwrap();
        assert_eq!(claims.group, "alice");
        assert_eq!(claims.role, "bronze");
        assert!(!claims.is_expired());

        // Mint persisted the refresh fingerprint, not the token.
        let raw = store.get("tenant:alice").await.unwrap().unwrap();
        let record: RefreshRecord = serde_json::from_str(&raw).unwrap();
        assert!(record.matches(&pair.refresh));
        assert!(!raw.contains(&pair.refresh));
        assert_eq!(record.refresh_count, 0);
    }

    #[tokio::test]
    async fn test_validate_rejects_garbage() {
        let authority = authority(Arc::new(MemoryKvStore::new()));
        let err = authority.validate("not-a-token").unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_validate_rejects_expired() {
        let authority = authority(Arc::new(MemoryKvStore::new()));
        let token = expired_access(&authority, "alice", "bronze");
        assert!(matches!(
            authority.validate(&token),
            Err(TokenError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_foreign_algorithm() {
        let authority = authority(Arc::new(MemoryKvStore::new()));
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            iss: "storgate".to_string(),
            aud: "storgate".to_string(),
            sub: "alice".to_string(),
            exp: now + 300,
            iat: now,
            role: "bronze".to_string(),
            group: "alice".to_string(),
        };
        let hs384 = jsonwebtoken::encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(
            authority.validate(&hs384),
            Err(TokenError::WrongAlgorithm)
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_secret() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let minter = TokenAuthority::new(b"other-secret", TokenConfig::default(), store.clone());
        let verifier = authority(store);

        let pair = minter.mint("alice", "bronze").await.unwrap();
        assert!(matches!(
            verifier.validate(&pair.access),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_refresh_happy_path_increments_count() {
        let store = Arc::new(MemoryKvStore::new());
        let authority = authority(store.clone());

        let pair = authority.mint("alice", "bronze").await.unwrap();
        let old_claims = authority.validate(&pair.access).unwrap();
        let stale = expired_access(&authority, "alice", "bronze");

        let new_access = authority.refresh(&stale, &pair.refresh).await.unwrap();
        let new_claims = authority.validate(&new_access).unwrap();
        assert_eq!(new_claims.group, "alice");
        assert_eq!(new_claims.role, "bronze");
        assert!(new_claims.exp >= old_claims.exp);

        let raw = store.get("tenant:alice").await.unwrap().unwrap();
        let record: RefreshRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.refresh_count, 1);

        // A second exchange bumps it again.
        authority.refresh(&stale, &pair.refresh).await.unwrap();
        let raw = store.get("tenant:alice").await.unwrap().unwrap();
        let record: RefreshRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.refresh_count, 2);
    }

    #[tokio::test]
    async fn test_refresh_rejects_valid_access() {
        let authority = authority(Arc::new(MemoryKvStore::new()));
        let pair = authority.mint("alice", "bronze").await.unwrap();

        let err = authority
            .refresh(&pair.access, &pair.refresh)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::AccessNotExpired));
        assert!(err.to_string().contains("access token was valid"));
    }

    #[tokio::test]
    async fn test_refresh_rejects_denied_group() {
        let store = Arc::new(MemoryKvStore::new());
        let authority = authority(store.clone());
        let pair = authority.mint("alice", "bronze").await.unwrap();
        store.set_add(DENY_LIST_KEY, "alice").await.unwrap();

        let stale = expired_access(&authority, "alice", "bronze");
        assert!(matches!(
            authority.refresh(&stale, &pair.refresh).await,
            Err(TokenError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_mismatched_fingerprint() {
        let store = Arc::new(MemoryKvStore::new());
        let authority = authority(store.clone());

        let first = authority.mint("alice", "bronze").await.unwrap();
        // Re-minting rotates the stored fingerprint.
        let _second = authority.mint("alice", "bronze").await.unwrap();

        let stale = expired_access(&authority, "alice", "bronze");
        assert!(matches!(
            authority.refresh(&stale, &first.refresh).await,
            Err(TokenError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage_access() {
        let authority = authority(Arc::new(MemoryKvStore::new()));
        let pair = authority.mint("alice", "bronze").await.unwrap();

        assert!(matches!(
            authority.refresh("garbage", &pair.refresh).await,
            Err(TokenError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_refresh_token() {
        let store = Arc::new(MemoryKvStore::new());
        let authority = authority(store.clone());
        authority.mint("alice", "bronze").await.unwrap();

        let stale_access = expired_access(&authority, "alice", "bronze");
        let stale_refresh = expired_access(&authority, "alice", "bronze");
        assert!(matches!(
            authority.refresh(&stale_access, &stale_refresh).await,
            Err(TokenError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_cross_tenant_tokens() {
        let authority = authority(Arc::new(MemoryKvStore::new()));
        let alice = authority.mint("alice", "bronze").await.unwrap();
        let _bob = authority.mint("bob", "silver").await.unwrap();

        let stale_bob = expired_access(&authority, "bob", "silver");
        assert!(matches!(
            authority.refresh(&stale_bob, &alice.refresh).await,
            Err(TokenError::Unauthorized { .. })
        ));
    }
}

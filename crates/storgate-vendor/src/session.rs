//! Per-system session credential cache.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::client::VendorClient;
use crate::error::VendorResult;

/// Default lifetime of a cached session credential.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// An ephemeral credential granted by an array after admin login.
///
/// Opaque to the proxy: the mediator only knows which header to set it on
/// when substituting the tenant's `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// Header to carry the credential on (`authorization` or `cookie`).
    pub header_name: String,

    /// The ready-to-send header value.
    pub header_value: String,
}

impl SessionCredential {
    pub fn authorization(value: impl Into<String>) -> Self {
        Self {
            header_name: "authorization".to_string(),
            header_value: value.into(),
        }
    }

    pub fn cookie(value: impl Into<String>) -> Self {
        Self {
            header_name: "cookie".to_string(),
            header_value: value.into(),
        }
    }
}

struct CachedSession {
    credential: SessionCredential,
    obtained: Instant,
}

impl CachedSession {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.obtained.elapsed() > ttl
    }
}

/// TTL cache of session credentials keyed by system id.
///
/// Latency-only: a lost or raced entry just means one extra login. Two
/// concurrent misses both log in; last write wins.
pub struct SessionCache {
    inner: DashMap<String, CachedSession>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            ttl,
        }
    }

    /// Returns the cached credential for `system_id`, logging in through
    /// `client` on miss or expiry.
    pub async fn get_or_login(
        &self,
        system_id: &str,
        client: &dyn VendorClient,
    ) -> VendorResult<SessionCredential> {
        if let Some(cached) = self.inner.get(system_id) {
            if !cached.is_expired(self.ttl) {
                return Ok(cached.credential.clone());
            }
        }

        debug!(system_id, "session cache miss; logging in");
        let credential = client.login().await?;
        self.inner.insert(
            system_id.to_string(),
            CachedSession {
                credential: credential.clone(),
                obtained: Instant::now(),
            },
        );
        Ok(credential)
    }

    /// Drops a system's cached session (e.g. after an upstream 401).
    pub fn invalidate(&self, system_id: &str) {
        self.inner.remove(system_id);
    }

    /// Drops every cached session (configuration change).
    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VendorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storgate_core::SystemType;

    struct CountingClient {
        logins: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl VendorClient for CountingClient {
        fn system_type(&self) -> SystemType {
            SystemType::PowerFlex
        }

        async fn login(&self) -> VendorResult<SessionCredential> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VendorError::login("sys", "nope"));
            }
            Ok(SessionCredential::authorization(format!("Basic token{n}")))
        }

        async fn resolve_volume(&self, _volume_id: &str) -> VendorResult<crate::VolumeInfo> {
            unimplemented!()
        }

        async fn resolve_pool_name(&self, _pool_id: &str) -> VendorResult<String> {
            unimplemented!()
        }

        async fn validate_pool_exists(&self, _pool_name: &str) -> VendorResult<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_cache_reuses_live_session() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let client = CountingClient {
            logins: AtomicUsize::new(0),
            fail: false,
        };

        let first = cache.get_or_login("sys", &client).await.unwrap();
        let second = cache.get_or_login("sys", &client).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_relogs_after_expiry() {
        let cache = SessionCache::new(Duration::from_secs(0));
        let client = CountingClient {
            logins: AtomicUsize::new(0),
            fail: false,
        };

        cache.get_or_login("sys", &client).await.unwrap();
        // TTL zero: the entry is already stale.
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get_or_login("sys", &client).await.unwrap();
        assert_eq!(client.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_login() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let client = CountingClient {
            logins: AtomicUsize::new(0),
            fail: false,
        };

        cache.get_or_login("sys", &client).await.unwrap();
        cache.invalidate("sys");
        cache.get_or_login("sys", &client).await.unwrap();
        assert_eq!(client.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_login_failure_is_not_cached() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let client = CountingClient {
            logins: AtomicUsize::new(0),
            fail: true,
        };

        assert!(cache.get_or_login("sys", &client).await.is_err());
        assert!(cache.get_or_login("sys", &client).await.is_err());
        assert_eq!(client.logins.load(Ordering::SeqCst), 2);
    }
}

//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use storgate_config::ConfigStore;
use storgate_core::{StorageSystem, SystemType};
use storgate_ledger::QuotaLedger;
use storgate_policy::PolicyClient;
use storgate_token::TokenAuthority;
use storgate_vendor::{SessionCache, SessionCredential, VendorClient, build_client};

use crate::errors::ApiError;

/// Everything a request handler needs.
///
/// Cheap to clone: all members are behind `Arc` or internally shared. The
/// process-local caches (vendor clients, sessions, pool names) are
/// latency-only; correctness state lives in the shared store.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenAuthority>,
    pub policy: PolicyClient,
    pub ledger: QuotaLedger,
    pub config: Arc<dyn ConfigStore>,
    pub forward_timeout: Duration,
    login_timeout: Duration,
    vendors: Arc<DashMap<(SystemType, String), Arc<dyn VendorClient>>>,
    forwarders: Arc<DashMap<String, reqwest::Client>>,
    sessions: Arc<SessionCache>,
    pool_names: Arc<DashMap<(String, String), String>>,
}

impl AppState {
    pub fn new(
        tokens: Arc<TokenAuthority>,
        policy: PolicyClient,
        ledger: QuotaLedger,
        config: Arc<dyn ConfigStore>,
        login_timeout: Duration,
        session_ttl: Duration,
        forward_timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            tokens,
            policy,
            ledger,
            config,
            forward_timeout,
            login_timeout,
            vendors: Arc::new(DashMap::new()),
            forwarders: Arc::new(DashMap::new()),
            sessions: Arc::new(SessionCache::new(session_ttl)),
            pool_names: Arc::new(DashMap::new()),
        })
    }

    /// The HTTP client used to forward to one system. Per-system because
    /// TLS verification follows the system's `insecure` flag.
    pub fn forward_client(
        &self,
        system_id: &str,
        system: &StorageSystem,
    ) -> Result<reqwest::Client, ApiError> {
        if let Some(client) = self.forwarders.get(system_id) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(system.insecure)
            .build()
            .map_err(|e| ApiError::internal(e.to_string()))?;
        self.forwarders.insert(system_id.to_string(), client.clone());
        Ok(client)
    }

    /// The vendor adapter for a registered system, built on first use.
    pub fn vendor(
        &self,
        system_type: SystemType,
        system_id: &str,
        system: &StorageSystem,
    ) -> Result<Arc<dyn VendorClient>, ApiError> {
        let key = (system_type, system_id.to_string());
        if let Some(client) = self.vendors.get(&key) {
            return Ok(client.clone());
        }
        let client = build_client(system_type, system_id, system, self.login_timeout)?;
        self.vendors.insert(key, client.clone());
        Ok(client)
    }

    /// The session credential for a system, cached with a short TTL.
    pub async fn session_credential(
        &self,
        system_type: SystemType,
        system_id: &str,
        system: &StorageSystem,
    ) -> Result<SessionCredential, ApiError> {
        let client = self.vendor(system_type, system_id, system)?;
        Ok(self
            .sessions
            .get_or_login(system_id, client.as_ref())
            .await?)
    }

    /// Resolves a pool id to its name through the adapter, memoized per
    /// `(system_id, pool_id)` until the next configuration change.
    pub async fn pool_name(
        &self,
        system_type: SystemType,
        system_id: &str,
        system: &StorageSystem,
        pool_id: &str,
    ) -> Result<String, ApiError> {
        let key = (system_id.to_string(), pool_id.to_string());
        if let Some(name) = self.pool_names.get(&key) {
            return Ok(name.clone());
        }
        let client = self.vendor(system_type, system_id, system)?;
        let name = client.resolve_pool_name(pool_id).await?;
        debug!(system_id, pool_id, pool = %name, "resolved pool name");
        self.pool_names.insert(key, name.clone());
        Ok(name)
    }

    /// Drops every process-local resolution cache. Called when the
    /// configuration generation changes; the next request rebuilds them
    /// against the new snapshot.
    pub fn invalidate_caches(&self) {
        self.vendors.clear();
        self.forwarders.clear();
        self.pool_names.clear();
        self.sessions.clear();
    }

    /// Watches the configuration generation channel and invalidates caches
    /// on change.
    pub fn spawn_cache_invalidation(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let mut generation = state.config.subscribe();
        tokio::spawn(async move {
            while generation.changed().await.is_ok() {
                info!("configuration changed; invalidating resolution caches");
                state.invalidate_caches();
            }
        })
    }
}

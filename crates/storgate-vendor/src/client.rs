//! The vendor capability trait and client factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use storgate_core::{StorageSystem, SystemType};

use crate::error::VendorResult;
use crate::powerflex::PowerFlexClient;
use crate::powermax::PowerMaxClient;
use crate::powerscale::PowerScaleClient;
use crate::session::SessionCredential;

/// Default bound on a single login round trip.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A resolved volume: display name plus the pool it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    /// Opaque pool id; empty when the array has no pool notion (powerscale).
    pub pool_id: String,
}

/// The capability set every array family provides.
///
/// One client instance serves one registered `(system_type, system_id)` and
/// owns that system's admin credentials; nothing is shared across adapters.
#[async_trait]
pub trait VendorClient: Send + Sync {
    /// The array family this client speaks to.
    fn system_type(&self) -> SystemType;

    /// Logs in with the configured admin credentials and returns the
    /// session credential the mediator substitutes into forwarded requests.
    async fn login(&self) -> VendorResult<SessionCredential>;

    /// Resolves a volume from its opaque array id: its display name plus
    /// the id of the pool it lives in (the delete path keys quota
    /// accounting by pool).
    async fn resolve_volume(&self, volume_id: &str) -> VendorResult<VolumeInfo>;

    /// Resolves a storage pool's name from its opaque array id.
    async fn resolve_pool_name(&self, pool_id: &str) -> VendorResult<String>;

    /// Verifies that `pool_name` exists on the array.
    async fn validate_pool_exists(&self, pool_name: &str) -> VendorResult<()>;
}

/// Builds the adapter for a registered storage system.
pub fn build_client(
    system_type: SystemType,
    system_id: &str,
    system: &StorageSystem,
    timeout: Duration,
) -> VendorResult<Arc<dyn VendorClient>> {
    Ok(match system_type {
        SystemType::PowerFlex => Arc::new(PowerFlexClient::new(system_id, system, timeout)?),
        SystemType::PowerMax => Arc::new(PowerMaxClient::new(system_id, system, timeout)?),
        SystemType::PowerScale => Arc::new(PowerScaleClient::new(system_id, system, timeout)?),
    })
}

/// Shared construction of the per-system HTTP client.
pub(crate) fn http_client(system: &StorageSystem, timeout: Duration) -> VendorResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(system.insecure)
        .build()
        .map_err(|e| crate::error::VendorError::request(e.to_string()))
}

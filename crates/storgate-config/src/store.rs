//! The config store trait and its file + shared-store implementation.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use storgate_core::{RoleKey, StorageSystem, SystemType};
use storgate_store::KvStore;

use crate::documents::{RoleSpec, RolesDocument, StorageDocument};
use crate::{ConfigError, ConfigResult};

const TENANT_PREFIX: &str = "tenant:";
const DENY_LIST_KEY: &str = "tenant:deny";

/// Read-mostly view of the administrative configuration.
///
/// Storage systems and roles come from mounted documents; tenants and the
/// deny list from the shared store. The mediator treats all of it as
/// eventually consistent.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All registered storage systems as `(type, id, system)` rows.
    fn list_storage(&self) -> Vec<(SystemType, String, StorageSystem)>;

    /// One registered storage system.
    fn get_storage(&self, system_type: SystemType, system_id: &str) -> Option<StorageSystem>;

    /// One named role, with all its pool entries.
    fn get_role(&self, name: &str) -> Option<RoleSpec>;

    /// Quota (kilobytes) for a fully scoped role entry.
    fn quota_for(&self, key: &RoleKey) -> Option<u64>;

    /// The whole roles document, as served by `GET /proxy/roles/`.
    fn roles_document(&self) -> serde_json::Value;

    /// Groups with a refresh record in the shared store.
    async fn list_tenants(&self) -> ConfigResult<Vec<String>>;

    /// Groups on the deny list.
    async fn get_denied(&self) -> ConfigResult<Vec<String>>;

    /// Deny-list membership for one group.
    async fn is_denied(&self, group: &str) -> ConfigResult<bool>;

    /// Generation channel; the value bumps on every successful reload.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

struct Snapshot {
    storage: StorageDocument,
    roles: RolesDocument,
}

/// `ConfigStore` over two mounted JSON files plus the shared store.
pub struct FileConfigStore {
    storage_path: PathBuf,
    roles_path: PathBuf,
    snapshot: ArcSwap<Snapshot>,
    kv: Arc<dyn KvStore>,
    generation: watch::Sender<u64>,
}

impl FileConfigStore {
    /// Loads and validates both documents; fails fast on a broken mount.
    pub fn load(
        storage_path: impl Into<PathBuf>,
        roles_path: impl Into<PathBuf>,
        kv: Arc<dyn KvStore>,
    ) -> ConfigResult<Arc<Self>> {
        let storage_path = storage_path.into();
        let roles_path = roles_path.into();
        let snapshot = read_snapshot(&storage_path, &roles_path)?;
        let (generation, _) = watch::channel(0);

        info!(
            storage = %storage_path.display(),
            roles = %roles_path.display(),
            systems = snapshot.storage.systems().count(),
            roles_count = snapshot.roles.roles.len(),
            "configuration loaded"
        );

        Ok(Arc::new(Self {
            storage_path,
            roles_path,
            snapshot: ArcSwap::from_pointee(snapshot),
            kv,
            generation,
        }))
    }

    /// Re-reads both documents. A reload that fails to parse or validate
    /// keeps the previous snapshot.
    pub fn reload(&self) {
        match read_snapshot(&self.storage_path, &self.roles_path) {
            Ok(snapshot) => {
                self.snapshot.store(Arc::new(snapshot));
                self.generation.send_modify(|g| *g += 1);
                info!("configuration reloaded successfully");
            }
            Err(e) => {
                warn!(error = %e, "configuration reload failed; keeping previous snapshot");
            }
        }
    }

    /// Paths the file watcher should observe.
    pub(crate) fn watched_paths(&self) -> Vec<PathBuf> {
        vec![self.storage_path.clone(), self.roles_path.clone()]
    }
}

fn read_snapshot(storage_path: &PathBuf, roles_path: &PathBuf) -> ConfigResult<Snapshot> {
    let storage_raw = std::fs::read_to_string(storage_path)?;
    let storage: StorageDocument = serde_json::from_str(&storage_raw)
        .map_err(|e| ConfigError::parse(format!("{}: {e}", storage_path.display())))?;
    storage.validate()?;

    let roles_raw = std::fs::read_to_string(roles_path)?;
    let roles: RolesDocument = serde_json::from_str(&roles_raw)
        .map_err(|e| ConfigError::parse(format!("{}: {e}", roles_path.display())))?;
    roles.validate()?;

    Ok(Snapshot { storage, roles })
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    fn list_storage(&self) -> Vec<(SystemType, String, StorageSystem)> {
        self.snapshot
            .load()
            .storage
            .systems()
            .map(|(ty, id, system)| (ty, id.clone(), system.clone()))
            .collect()
    }

    fn get_storage(&self, system_type: SystemType, system_id: &str) -> Option<StorageSystem> {
        self.snapshot
            .load()
            .storage
            .get(system_type, system_id)
            .cloned()
    }

    fn get_role(&self, name: &str) -> Option<RoleSpec> {
        self.snapshot.load().roles.roles.get(name).cloned()
    }

    fn quota_for(&self, key: &RoleKey) -> Option<u64> {
        self.snapshot.load().roles.quota_for(key)
    }

    fn roles_document(&self) -> serde_json::Value {
        serde_json::to_value(&self.snapshot.load().roles).unwrap_or_default()
    }

    async fn list_tenants(&self) -> ConfigResult<Vec<String>> {
        let keys = self.kv.keys_with_prefix(TENANT_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter(|k| k != DENY_LIST_KEY)
            .filter_map(|k| k.strip_prefix(TENANT_PREFIX).map(str::to_string))
            .collect())
    }

    async fn get_denied(&self) -> ConfigResult<Vec<String>> {
        Ok(self.kv.set_members(DENY_LIST_KEY).await?)
    }

    async fn is_denied(&self, group: &str) -> ConfigResult<bool> {
        Ok(self.kv.set_contains(DENY_LIST_KEY, group).await?)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

//! The storage-systems and roles documents.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use storgate_core::{RoleKey, StorageSystem, SystemType};

use crate::{ConfigError, ConfigResult};

/// The registered storage systems, keyed type → system id.
///
/// ```json
/// {"storage": {"powerflex": {"542a2d5f5122210f": {"endpoint": "…", "user": "…", "password": "…", "insecure": true}}}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageDocument {
    #[serde(default)]
    pub storage: HashMap<SystemType, HashMap<String, StorageSystem>>,
}

impl StorageDocument {
    pub fn get(&self, system_type: SystemType, system_id: &str) -> Option<&StorageSystem> {
        self.storage.get(&system_type)?.get(system_id)
    }

    /// Flattens to `(type, id, system)` rows.
    pub fn systems(&self) -> impl Iterator<Item = (SystemType, &String, &StorageSystem)> {
        self.storage.iter().flat_map(|(ty, systems)| {
            systems.iter().map(move |(id, system)| (*ty, id, system))
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (ty, id, system) in self.systems() {
            url::Url::parse(&system.endpoint).map_err(|e| {
                ConfigError::validation(format!("storage {ty}/{id}: bad endpoint: {e}"))
            })?;
            if system.user.is_empty() {
                return Err(ConfigError::validation(format!(
                    "storage {ty}/{id}: user is empty"
                )));
            }
        }
        Ok(())
    }
}

/// The roles document.
///
/// ```json
/// {"roles": {"bronze": {"system_types": {"powerflex": {"system_ids": {"542a…": {"pool_quotas": {"bronze": 44000000}}}}}}}}
/// ```
///
/// Quotas are integer kilobytes scoped to one pool of one system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesDocument {
    #[serde(default)]
    pub roles: HashMap<String, RoleSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleSpec {
    #[serde(default)]
    pub system_types: HashMap<SystemType, SystemRoles>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemRoles {
    #[serde(default)]
    pub system_ids: HashMap<String, PoolQuotas>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolQuotas {
    #[serde(default)]
    pub pool_quotas: HashMap<String, u64>,
}

impl RolesDocument {
    /// Looks up the quota for one fully scoped role entry.
    pub fn quota_for(&self, key: &RoleKey) -> Option<u64> {
        self.roles
            .get(&key.name)?
            .system_types
            .get(&key.system_type)?
            .system_ids
            .get(&key.system_id)?
            .pool_quotas
            .get(&key.pool)
            .copied()
    }

    /// Flattens the document into `(RoleKey, quota_kb)` rows.
    pub fn entries(&self) -> Vec<(RoleKey, u64)> {
        let mut out = Vec::new();
        for (name, spec) in &self.roles {
            for (ty, systems) in &spec.system_types {
                for (system_id, pools) in &systems.system_ids {
                    for (pool, quota) in &pools.pool_quotas {
                        out.push((
                            RoleKey {
                                name: name.clone(),
                                system_type: *ty,
                                system_id: system_id.clone(),
                                pool: pool.clone(),
                            },
                            *quota,
                        ));
                    }
                }
            }
        }
        out
    }

    /// Powerscale entries must carry a zero quota: authorization does not
    /// enforce powerscale capacity.
    pub fn validate(&self) -> ConfigResult<()> {
        for (key, quota) in self.entries() {
            if key.system_type == SystemType::PowerScale && quota != 0 {
                return Err(ConfigError::validation(format!(
                    "role {}: powerscale quota must be zero, got {quota}",
                    key.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_json() -> &'static str {
        r#"{
            "storage": {
                "powerflex": {
                    "542a2d5f5122210f": {
                        "endpoint": "https://10.0.0.2",
                        "user": "admin",
                        "password": "secret",
                        "insecure": true
                    }
                }
            }
        }"#
    }

    fn roles_json() -> &'static str {
        r#"{
            "roles": {
                "bronze": {
                    "system_types": {
                        "powerflex": {
                            "system_ids": {
                                "542a2d5f5122210f": {
                                    "pool_quotas": {"bronze": 44000000}
                                }
                            }
                        }
                    }
                }
            }
        }"#
    }

    #[test]
    fn test_storage_document_lookup() {
        let doc: StorageDocument = serde_json::from_str(storage_json()).unwrap();
        doc.validate().unwrap();

        let system = doc.get(SystemType::PowerFlex, "542a2d5f5122210f").unwrap();
        assert_eq!(system.user, "admin");
        assert!(doc.get(SystemType::PowerMax, "542a2d5f5122210f").is_none());
        assert_eq!(doc.systems().count(), 1);
    }

    #[test]
    fn test_storage_document_rejects_bad_endpoint() {
        let doc: StorageDocument = serde_json::from_str(
            r#"{"storage": {"powerflex": {"x": {"endpoint": "not a url", "user": "u", "password": "p"}}}}"#,
        )
        .unwrap();
        assert!(matches!(doc.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_roles_document_quota_lookup() {
        let doc: RolesDocument = serde_json::from_str(roles_json()).unwrap();
        doc.validate().unwrap();

        let key = RoleKey {
            name: "bronze".to_string(),
            system_type: SystemType::PowerFlex,
            system_id: "542a2d5f5122210f".to_string(),
            pool: "bronze".to_string(),
        };
        assert_eq!(doc.quota_for(&key), Some(44_000_000));

        let missing = RoleKey {
            pool: "gold".to_string(),
            ..key
        };
        assert_eq!(doc.quota_for(&missing), None);
    }

    #[test]
    fn test_roles_document_rejects_nonzero_powerscale_quota() {
        let doc: RolesDocument = serde_json::from_str(
            r#"{"roles": {"scale": {"system_types": {"powerscale": {"system_ids": {"c1": {"pool_quotas": {"/ifs/data": 5}}}}}}}}"#,
        )
        .unwrap();
        assert!(matches!(doc.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_roles_document_accepts_zero_powerscale_quota() {
        let doc: RolesDocument = serde_json::from_str(
            r#"{"roles": {"scale": {"system_types": {"powerscale": {"system_ids": {"c1": {"pool_quotas": {"/ifs/data": 0}}}}}}}}"#,
        )
        .unwrap();
        doc.validate().unwrap();
    }

    #[test]
    fn test_entries_flattening() {
        let doc: RolesDocument = serde_json::from_str(roles_json()).unwrap();
        let entries = doc.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.name, "bronze");
        assert_eq!(entries[0].1, 44_000_000);
    }

    #[test]
    fn test_empty_documents_are_valid() {
        let storage: StorageDocument = serde_json::from_str("{}").unwrap();
        storage.validate().unwrap();
        let roles: RolesDocument = serde_json::from_str("{}").unwrap();
        roles.validate().unwrap();
    }
}

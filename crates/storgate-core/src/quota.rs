use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::system::SystemType;

/// One pool-scoped entry of a named role.
///
/// Multiple entries sharing `name` form one role. `quota_kb` is an integer
/// count of kilobytes; zero means "no capacity" for quota-enforcing system
/// types and is the only legal value for powerscale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleKey {
    pub name: String,
    pub system_type: SystemType,
    pub system_id: String,
    pub pool: String,
}

/// A capacity reservation request flowing into the quota ledger.
///
/// The tuple `(storage_pool_id, group, volume_name)` identifies the request
/// across its whole lifetime; retries of the same provisioning attempt carry
/// the same tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRequest {
    pub storage_pool_id: String,
    pub group: String,
    pub volume_name: String,
    pub capacity_kb: u64,
}

impl QuotaRequest {
    pub fn new(
        storage_pool_id: impl Into<String>,
        group: impl Into<String>,
        volume_name: impl Into<String>,
        capacity_kb: u64,
    ) -> Self {
        Self {
            storage_pool_id: storage_pool_id.into(),
            group: group.into(),
            volume_name: volume_name.into(),
            capacity_kb,
        }
    }
}

/// Parses the decimal kilobyte count the array wire formats carry as a
/// string (e.g. powerflex `volumeSizeInKb: "8388608"`).
pub fn parse_capacity_kb(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid_capacity("capacity is empty"));
    }
    trimmed
        .parse::<u64>()
        .map_err(|e| CoreError::invalid_capacity(format!("{trimmed:?}: {e}")))
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection details for one registered storage array.
///
/// Rows are keyed `(system_type, system_id)` in the storage document; the
/// id is an opaque string assigned by the array itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSystem {
    /// Base URL of the array's management endpoint.
    pub endpoint: String,

    /// Administrative user the proxy logs in as.
    pub user: String,

    /// Administrative password. Never logged; see the `Debug` impl.
    pub password: String,

    /// Skip TLS verification for self-signed array certificates.
    #[serde(default)]
    pub insecure: bool,
}

// Manual Debug so the admin password cannot leak through `{:?}` logging.
impl fmt::Debug for StorageSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSystem")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .finish()
    }
}

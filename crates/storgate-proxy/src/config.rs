//! Proxy configuration: layered file + environment loading.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level proxy configuration.
///
/// Loaded from an optional config file overlaid with `STORGATE_*`
/// environment variables. The `logging` section is hot-reloadable: the
/// server re-reads the file on change and applies the new level/format
/// without a restart.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen: ListenConfig,
    pub policy: PolicyConfig,
    pub store: StoreConfig,
    pub token: TokenConfig,
    pub documents: DocumentsConfig,
    pub vendor: VendorConfig,
    pub forward: ForwardConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
    pub otel: OtelConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            policy: PolicyConfig::default(),
            store: StoreConfig::default(),
            token: TokenConfig::default(),
            documents: DocumentsConfig::default(),
            vendor: VendorConfig::default(),
            forward: ForwardConfig::default(),
            ledger: LedgerConfig::default(),
            logging: LoggingConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Base URL of the decision engine.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8181".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://` URL of the shared store. Unset means a process-local
    /// store: fine for a single replica, wrong for more.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Mounted file holding the shared signing secret.
    pub secret_path: PathBuf,
    pub issuer: String,
    pub audience: String,
    pub access_lifetime_secs: i64,
    pub refresh_lifetime_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret_path: PathBuf::from("/etc/storgate/secret"),
            issuer: "storgate".to_string(),
            audience: "storgate".to_string(),
            access_lifetime_secs: 300,
            refresh_lifetime_secs: 30 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Mounted storage-systems document.
    pub storage_path: PathBuf,
    /// Mounted roles document.
    pub roles_path: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("/etc/storgate/storage.json"),
            roles_path: PathBuf::from("/etc/storgate/roles.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    pub login_timeout_secs: u64,
    pub session_ttl_secs: u64,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: 30,
            session_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub fence_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fence_after_secs: 180,
            sweep_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OtelConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

impl ProxyConfig {
    /// Loads configuration from `path` (if given) overlaid with
    /// `STORGATE_*` environment variables (`__` as section separator, e.g.
    /// `STORGATE_POLICY__URL`).
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        builder
            .add_source(
                ::config::Environment::with_prefix("STORGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn policy_timeout(&self) -> Duration {
        Duration::from_secs(self.policy.timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.vendor.login_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.vendor.session_ttl_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward.timeout_secs)
    }

    pub fn fence_after(&self) -> Duration {
        Duration::from_secs(self.ledger.fence_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.ledger.sweep_interval_secs)
    }
}

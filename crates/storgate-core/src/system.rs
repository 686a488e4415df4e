use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The storage array families the proxy can mediate for.
///
/// The string forms (`powerflex`, `powermax`, `powerscale`) are part of the
/// wire contract: they key the storage-systems document, the roles document,
/// and the `Forwarded` header pair the sidecar sets on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemType {
    PowerFlex,
    PowerMax,
    PowerScale,
}

impl SystemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PowerFlex => "powerflex",
            Self::PowerMax => "powermax",
            Self::PowerScale => "powerscale",
        }
    }

    /// Whether role quotas are enforced for this system type.
    ///
    /// Powerscale roles carry a mandatory zero quota and are exempt from
    /// ledger accounting.
    pub fn enforces_quota(&self) -> bool {
        !matches!(self, Self::PowerScale)
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SystemType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "powerflex" => Ok(Self::PowerFlex),
            "powermax" => Ok(Self::PowerMax),
            "powerscale" => Ok(Self::PowerScale),
            other => Err(CoreError::unknown_system_type(other)),
        }
    }
}

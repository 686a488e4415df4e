use serde::Deserialize;

/// Policy path for the coarse per-URL authorization gate.
pub const URL_POLICY: &str = "/karavi/authz/url";

/// Policy path for volume-create decisions.
pub const CREATE_POLICY: &str = "/karavi/volumes/create";

/// Policy path for volume-delete decisions.
pub const DELETE_POLICY: &str = "/karavi/volumes/delete";

/// Result shape of the URL gate: `{result: {allow: bool}}`.
///
/// Every field defaults to the denying value, so a policy that returns an
/// empty object denies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlDecision {
    #[serde(default)]
    pub allow: bool,
}

/// Result shape of the volume decisions:
/// `{result: {response: {allowed, status: {reason}}, token: {group}, quota}}`.
///
/// `quota` is the cap the quota ledger enforces on approval, not the
/// requested capacity. Deletes carry the same shape with `quota` unused.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeDecision {
    #[serde(default)]
    pub response: VolumeResponse,

    #[serde(default)]
    pub token: TokenSubject,

    /// Role quota cap in kilobytes.
    #[serde(default)]
    pub quota: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeResponse {
    #[serde(default)]
    pub allowed: bool,

    #[serde(default)]
    pub status: DecisionStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionStatus {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenSubject {
    #[serde(default)]
    pub group: String,
}

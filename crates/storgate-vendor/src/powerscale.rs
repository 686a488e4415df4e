//! PowerScale (Isilon) adapter.
//!
//! Sessions come from `POST /session/1/session`, which sets an `isisessid`
//! cookie; that cookie is the session credential. "Pools" are filesystem
//! paths under `/ifs`, validated by probing the namespace API. Quota is not
//! enforced for powerscale — a powerscale role's quota is zero by contract —
//! so name/id resolution is the identity mapping on paths.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use storgate_core::{StorageSystem, SystemType};

use crate::client::{VendorClient, VolumeInfo, http_client};
use crate::error::{VendorError, VendorResult};
use crate::session::SessionCredential;

const SESSION_COOKIE: &str = "isisessid";

pub struct PowerScaleClient {
    http: reqwest::Client,
    base: String,
    system_id: String,
    user: String,
    password: String,
}

impl PowerScaleClient {
    pub fn new(
        system_id: &str,
        system: &StorageSystem,
        timeout: Duration,
    ) -> VendorResult<Self> {
        Ok(Self {
            http: http_client(system, timeout)?,
            base: system.endpoint.trim_end_matches('/').to_string(),
            system_id: system_id.to_string(),
            user: system.user.clone(),
            password: system.password.clone(),
        })
    }

    async fn session_cookie(&self) -> VendorResult<String> {
        let response = self
            .http
            .post(format!("{}/session/1/session", self.base))
            .json(&json!({
                "username": self.user,
                "password": self.password,
                "services": ["platform", "namespace"],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::login(
                &self.system_id,
                format!("cluster returned {status}"),
            ));
        }

        for cookie in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let Ok(text) = cookie.to_str() else { continue };
            if let Some(pair) = text.split(';').next() {
                if pair.trim_start().starts_with(SESSION_COOKIE) {
                    return Ok(pair.trim().to_string());
                }
            }
        }

        Err(VendorError::login(
            &self.system_id,
            "session reply carried no isisessid cookie",
        ))
    }

    fn normalized_path(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        format!("/{trimmed}")
    }
}

#[async_trait]
impl VendorClient for PowerScaleClient {
    fn system_type(&self) -> SystemType {
        SystemType::PowerScale
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn login(&self) -> VendorResult<SessionCredential> {
        let cookie = self.session_cookie().await?;
        debug!(system_id = %self.system_id, "powerscale login succeeded");
        Ok(SessionCredential::cookie(cookie))
    }

    /// Powerscale volumes are directories; the id already is the name, and
    /// there is no pool to report.
    async fn resolve_volume(&self, volume_id: &str) -> VendorResult<VolumeInfo> {
        Ok(VolumeInfo {
            name: volume_id.to_string(),
            pool_id: String::new(),
        })
    }

    /// Pools map to isilon paths; normalization is the whole resolution.
    async fn resolve_pool_name(&self, pool_id: &str) -> VendorResult<String> {
        Ok(Self::normalized_path(pool_id))
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn validate_pool_exists(&self, pool_name: &str) -> VendorResult<()> {
        let cookie = self.session_cookie().await?;
        let path = Self::normalized_path(pool_name);
        let response = self
            .http
            .get(format!("{}/namespace{path}", self.base))
            .query(&[("metadata", "")])
            .header("cookie", cookie)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VendorError::not_found("path", path));
        }
        if !status.is_success() {
            return Err(VendorError::request(format!("cluster returned {status}")));
        }
        Ok(())
    }
}

//! PowerMax (Unisphere) adapter.
//!
//! Unisphere authenticates every call with basic admin auth; "login" is a
//! probe of `/univmax/restapi/version` that proves the credentials before
//! they are handed to the mediator. Pools are SRPs scoped by symmetrix
//! system id.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, instrument};

use storgate_core::{StorageSystem, SystemType};

use crate::client::{VendorClient, VolumeInfo, http_client};
use crate::error::{VendorError, VendorResult};
use crate::session::SessionCredential;

const SLO_PROVISIONING: &str = "univmax/restapi/100/sloprovisioning/symmetrix";

pub struct PowerMaxClient {
    http: reqwest::Client,
    base: String,
    system_id: String,
    user: String,
    password: String,
}

#[derive(Deserialize)]
struct SrpInstance {
    #[serde(rename = "srpId")]
    srp_id: String,
}

#[derive(Deserialize)]
struct SrpList {
    #[serde(rename = "srpId", default)]
    srp_id: Vec<String>,
}

#[derive(Deserialize)]
struct VolumeInstance {
    #[serde(default)]
    volume_identifier: String,
    #[serde(default)]
    srp: String,
}

impl PowerMaxClient {
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

    fn basic_auth(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.user, self.password))
        )
    }

    fn provisioning_url(&self, suffix: &str) -> String {
        format!(
            "{}/{SLO_PROVISIONING}/{}{suffix}",
            self.base, self.system_id
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        kind: &str,
        id: &str,
    ) -> VendorResult<T> {
        let response = self
            .http
            .get(url)
            .header("authorization", self.basic_auth())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VendorError::not_found(kind, id));
        }
        if !status.is_success() {
            return Err(VendorError::request(format!("array returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| VendorError::decode(e.to_string()))
    }
}

#[async_trait]
impl VendorClient for PowerMaxClient {
    fn system_type(&self) -> SystemType {
        SystemType::PowerMax
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn login(&self) -> VendorResult<SessionCredential> {
        let response = self
            .http
            .get(format!("{}/univmax/restapi/version", self.base))
            .header("authorization", self.basic_auth())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::login(
                &self.system_id,
                format!("array returned {status}"),
            ));
        }

        debug!(system_id = %self.system_id, "powermax login succeeded");
        Ok(SessionCredential::authorization(self.basic_auth()))
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn resolve_volume(&self, volume_id: &str) -> VendorResult<VolumeInfo> {
        let volume: VolumeInstance = self
            .get_json(
                self.provisioning_url(&format!("/volume/{volume_id}")),
                "volume",
                volume_id,
            )
            .await?;
        if volume.volume_identifier.is_empty() {
            return Err(VendorError::not_found("volume", volume_id));
        }
        Ok(VolumeInfo {
            name: volume.volume_identifier,
            pool_id: volume.srp,
        })
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn resolve_pool_name(&self, pool_id: &str) -> VendorResult<String> {
        let srp: SrpInstance = self
            .get_json(
                self.provisioning_url(&format!("/srp/{pool_id}")),
                "storage pool",
                pool_id,
            )
            .await?;
        Ok(srp.srp_id)
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn validate_pool_exists(&self, pool_name: &str) -> VendorResult<()> {
        let srps: SrpList = self
            .get_json(self.provisioning_url("/srp"), "storage pool", pool_name)
            .await?;
        if srps.srp_id.iter().any(|id| id == pool_name) {
            Ok(())
        } else {
            Err(VendorError::not_found("storage pool", pool_name))
        }
    }
}

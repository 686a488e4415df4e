//! PowerFlex (ScaleIO) adapter.
//!
//! REST surface under `/api`. Login is basic admin auth against
//! `/api/login`, returning a bare JSON string token; subsequent calls use
//! basic auth with that token as the password. Volumes and pools are
//! addressed as `Volume::<id>` / `StoragePool::<id>` instance references.

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

pub struct PowerFlexClient {
    http: reqwest::Client,
    base: String,
    system_id: String,
    user: String,
    password: String,
}

#[derive(Deserialize)]
struct NamedInstance {
    name: String,
}

#[derive(Deserialize)]
struct VolumeResource {
    name: String,
    #[serde(rename = "storagePoolId", default)]
    storage_pool_id: String,
}

impl PowerFlexClient {
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

    /// Fetches a session token via `/api/login`.
    async fn session_token(&self) -> VendorResult<String> {
        let response = self
            .http
            .get(format!("{}/api/login", self.base))
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::login(
                &self.system_id,
                format!("array returned {status}"),
            ));
        }

        // The token comes back as a bare JSON string.
        let token: String = response.json().await.map_err(|e| {
            VendorError::login(&self.system_id, format!("unreadable token: {e}"))
        })?;
        Ok(token)
    }

    fn basic_with_token(&self, token: &str) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{token}", self.user))
        )
    }

    async fn get_instance<T: serde::de::DeserializeOwned>(
        &self,
        reference: &str,
        kind: &str,
    ) -> VendorResult<T> {
        let token = self.session_token().await?;
        let response = self
            .http
            .get(format!("{}/api/instances/{reference}", self.base))
            .header("authorization", self.basic_with_token(&token))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VendorError::not_found(kind, reference));
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
impl VendorClient for PowerFlexClient {
    fn system_type(&self) -> SystemType {
        SystemType::PowerFlex
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn login(&self) -> VendorResult<SessionCredential> {
        let token = self.session_token().await?;
        debug!(system_id = %self.system_id, "powerflex login succeeded");
        Ok(SessionCredential::authorization(
            self.basic_with_token(&token),
        ))
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn resolve_volume(&self, volume_id: &str) -> VendorResult<VolumeInfo> {
        let volume: VolumeResource = self
            .get_instance(&format!("Volume::{volume_id}"), "volume")
            .await?;
        Ok(VolumeInfo {
            name: volume.name,
            pool_id: volume.storage_pool_id,
        })
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn resolve_pool_name(&self, pool_id: &str) -> VendorResult<String> {
        let pool: NamedInstance = self
            .get_instance(&format!("StoragePool::{pool_id}"), "storage pool")
            .await?;
        Ok(pool.name)
    }

    #[instrument(skip(self), fields(system_id = %self.system_id))]
    async fn validate_pool_exists(&self, pool_name: &str) -> VendorResult<()> {
        let token = self.session_token().await?;
        let response = self
            .http
            .get(format!("{}/api/types/StoragePool/instances", self.base))
            .header("authorization", self.basic_with_token(&token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::request(format!("array returned {status}")));
        }

        let pools: Vec<NamedInstance> = response
            .json()
            .await
            .map_err(|e| VendorError::decode(e.to_string()))?;
        if pools.iter().any(|p| p.name == pool_name) {
            Ok(())
        } else {
            Err(VendorError::not_found("storage pool", pool_name))
        }
    }
}

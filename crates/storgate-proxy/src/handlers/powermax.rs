//! PowerMax mediation: volume create and delete under the sloprovisioning
//! surface.

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use storgate_core::{QuotaRequest, StorageSystem, SystemType};
use storgate_policy::{CREATE_POLICY, DELETE_POLICY, VolumeDecision};

use crate::errors::ApiError;
use crate::forward::{self, BODY_LIMIT};
use crate::state::AppState;

use super::dispatch::passthrough;

/// 1 powermax cylinder = 15 tracks × 128 KB.
const KB_PER_CYLINDER: u64 = 1920;

#[derive(Debug, Deserialize)]
struct CreateVolumeBody {
    #[serde(rename = "volumeIdentifier")]
    volume_identifier: VolumeIdentifier,
    volume_size: String,
    #[serde(rename = "capacityUnit", default = "default_unit")]
    capacity_unit: String,
    #[serde(rename = "srpId")]
    srp_id: String,
}

#[derive(Debug, Deserialize)]
struct VolumeIdentifier {
    identifier_name: String,
}

fn default_unit() -> String {
    "CYL".to_string()
}

/// Normalizes a sized unit to kilobytes.
fn capacity_kb(size: &str, unit: &str) -> Result<u64, ApiError> {
    let size: u64 = size
        .trim()
        .parse()
        .map_err(|e| ApiError::bad_request(format!("invalid volume_size {size:?}: {e}")))?;
    let multiplier = match unit {
        "KB" => 1,
        "MB" => 1024,
        "GB" => 1024 * 1024,
        "TB" => 1024 * 1024 * 1024,
        "CYL" => KB_PER_CYLINDER,
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown capacityUnit {other:?}"
            )));
        }
    };
    size.checked_mul(multiplier)
        .ok_or_else(|| ApiError::bad_request("volume_size overflows"))
}

pub async fn handle(
    state: AppState,
    system_id: String,
    system: StorageSystem,
    request: Request,
) -> Result<Response, ApiError> {
    let path = forward::path_and_query(request.uri())
        .split('?')
        .next()
        .unwrap_or("/")
        .trim_end_matches('/')
        .to_string();

    let volume_root = format!(
        "/univmax/restapi/100/sloprovisioning/symmetrix/{system_id}/volume"
    );

    if request.method() == Method::POST && path == volume_root {
        return create_volume(state, system_id, system, request).await;
    }
    if request.method() == Method::DELETE {
        if let Some(volume_id) = path.strip_prefix(&format!("{volume_root}/")) {
            if !volume_id.is_empty() && !volume_id.contains('/') {
                let volume_id = volume_id.to_string();
                return delete_volume(state, system_id, system, volume_id, request).await;
            }
        }
    }

    passthrough(&state, SystemType::PowerMax, &system_id, &system, request).await
}

#[instrument(skip_all, fields(system_id = %system_id))]
async fn create_volume(
    state: AppState,
    system_id: String,
    system: StorageSystem,
    request: Request,
) -> Result<Response, ApiError> {
    let claims = super::claims_of(&request)?;
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable request body: {e}")))?;

    let create: CreateVolumeBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid volume create body: {e}")))?;
    let capacity = capacity_kb(&create.volume_size, &create.capacity_unit)?;

    let pool_name = state
        .pool_name(SystemType::PowerMax, &system_id, &system, &create.srp_id)
        .await?;

    let decision: VolumeDecision = state
        .policy
        .decide_as(
            CREATE_POLICY,
            json!({
                "token": {"group": claims.group, "role": claims.role},
                "request": {
                    "name": create.volume_identifier.identifier_name,
                    "volumeSizeInKb": capacity.to_string(),
                    "storagePoolId": create.srp_id,
                },
                "storagepool": pool_name,
                "storagesystemid": system_id,
                "systemtype": SystemType::PowerMax.as_str(),
            }),
        )
        .await?;

    let group = super::require_allowed(&decision)?;
    if group.is_empty() {
        return Err(ApiError::unauthorized(
            "policy decision carried no tenant group",
        ));
    }
    let cap = u64::try_from(decision.quota).unwrap_or(0);
    let name = create.volume_identifier.identifier_name.clone();
    let qr = QuotaRequest::new(&pool_name, &group, &name, capacity);

    if !state.ledger.approve(&qr, cap).await? {
        info!(group = %group, pool = %pool_name, volume = %name, "create denied: quota exceeded");
        return Err(ApiError::InsufficientStorage);
    }

    let credential = state
        .session_credential(SystemType::PowerMax, &system_id, &system)
        .await?;
    let upstream = forward::forward(
        &state,
        &system_id,
        &system,
        &credential,
        parts.method,
        &forward::path_and_query(&parts.uri),
        &parts.headers,
        body,
    )
    .await?;

    if upstream.status == StatusCode::OK {
        if let Err(e) = state.ledger.publish_created(&qr).await {
            error!(error = %e, volume = %name, "failed to commit reservation");
        }
    } else {
        warn!(status = %upstream.status, volume = %name,
            "upstream create failed; reservation left for fencing");
    }

    Ok(upstream.into_response())
}

#[instrument(skip_all, fields(system_id = %system_id, volume_id = %volume_id))]
async fn delete_volume(
    state: AppState,
    system_id: String,
    system: StorageSystem,
    volume_id: String,
    request: Request,
) -> Result<Response, ApiError> {
    let claims = super::claims_of(&request)?;

    let vendor = state.vendor(SystemType::PowerMax, &system_id, &system)?;
    let volume = vendor.resolve_volume(&volume_id).await?;
    let pool_name = state
        .pool_name(SystemType::PowerMax, &system_id, &system, &volume.pool_id)
        .await?;

    let decision: VolumeDecision = state
        .policy
        .decide_as(
            DELETE_POLICY,
            json!({"token": {"group": claims.group, "role": claims.role}}),
        )
        .await?;
    let group = super::require_allowed(&decision)
        .map(|g| if g.is_empty() { claims.group.clone() } else { g })?;

    let qr = QuotaRequest::new(&pool_name, &group, &volume.name, 0);
    state.ledger.delete_request(&qr).await?;

    let credential = state
        .session_credential(SystemType::PowerMax, &system_id, &system)
        .await?;
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable request body: {e}")))?;
    let upstream = forward::forward(
        &state,
        &system_id,
        &system,
        &credential,
        parts.method,
        &forward::path_and_query(&parts.uri),
        &parts.headers,
        body,
    )
    .await?;

    if upstream.status == StatusCode::OK {
        if let Err(e) = state.ledger.publish_deleted(&qr).await {
            error!(error = %e, volume = %volume.name, "failed to publish deletion");
        }
    }

    Ok(upstream.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_normalization() {
        assert_eq!(capacity_kb("8", "KB").unwrap(), 8);
        assert_eq!(capacity_kb("8", "MB").unwrap(), 8 * 1024);
        assert_eq!(capacity_kb("2", "GB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(capacity_kb("1", "TB").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(capacity_kb("547", "CYL").unwrap(), 547 * 1920);
    }

    #[test]
    fn test_capacity_rejects_garbage() {
        assert!(capacity_kb("eight", "KB").is_err());
        assert!(capacity_kb("8", "PARSECS").is_err());
        assert!(capacity_kb(&u64::MAX.to_string(), "GB").is_err());
    }

    #[test]
    fn test_create_body_defaults_to_cylinders() {
        let body: CreateVolumeBody = serde_json::from_str(
            r#"{"volumeIdentifier": {"identifier_name": "pv-1"}, "volume_size": "547", "srpId": "SRP_1"}"#,
        )
        .unwrap();
        assert_eq!(body.capacity_unit, "CYL");
        assert_eq!(body.volume_identifier.identifier_name, "pv-1");
    }
}

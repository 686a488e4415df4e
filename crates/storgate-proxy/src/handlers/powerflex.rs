//! PowerFlex mediation: volume create, volume delete, login interception.

use axum::Json;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use storgate_core::{QuotaRequest, StorageSystem, SystemType, parse_capacity_kb};
use storgate_policy::{CREATE_POLICY, DELETE_POLICY, VolumeDecision};

use crate::errors::ApiError;
use crate::forward::{self, BODY_LIMIT};
use crate::state::AppState;

use super::dispatch::passthrough;

const VOLUME_CREATE_PATH: &str = "/api/types/Volume/instances";
const LOGIN_PATH: &str = "/api/login";

/// The create body fields the mediator cares about; the full body is
/// forwarded verbatim.
#[derive(Debug, Deserialize)]
struct CreateVolumeBody {
    #[serde(rename = "volumeSizeInKb")]
    volume_size_in_kb: String,
    #[serde(rename = "storagePoolId")]
    storage_pool_id: String,
    name: String,
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

    if request.method() == Method::POST && path == VOLUME_CREATE_PATH {
        return create_volume(state, system_id, system, request).await;
    }
    if let Some(volume_id) = remove_volume_target(&path) {
        if request.method() == Method::POST {
            let volume_id = volume_id.to_string();
            return delete_volume(state, system_id, system, volume_id, request).await;
        }
    }
    if path == LOGIN_PATH {
        return Ok(intercept_login());
    }

    passthrough(&state, SystemType::PowerFlex, &system_id, &system, request).await
}

/// Extracts the volume id from `/api/instances/Volume::<id>/action/removeVolume`.
fn remove_volume_target(path: &str) -> Option<&str> {
    path.strip_prefix("/api/instances/Volume::")?
        .strip_suffix("/action/removeVolume")
        .filter(|id| !id.is_empty())
}

/// Tenant logins never reach the array: the proxy answers with an inert
/// token so driver login loops succeed without holding array credentials.
fn intercept_login() -> Response {
    (StatusCode::OK, Json("storgate-proxy-session")).into_response()
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
    let capacity_kb =
        parse_capacity_kb(&create.volume_size_in_kb).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let pool_name = state
        .pool_name(
            SystemType::PowerFlex,
            &system_id,
            &system,
            &create.storage_pool_id,
        )
        .await?;

    let decision: VolumeDecision = state
        .policy
        .decide_as(
            CREATE_POLICY,
            json!({
                "token": {"group": claims.group, "role": claims.role},
                "request": {
                    "name": create.name,
                    "volumeSizeInKb": create.volume_size_in_kb,
                    "storagePoolId": create.storage_pool_id,
                },
                "storagepool": pool_name,
                "storagesystemid": system_id,
                "systemtype": SystemType::PowerFlex.as_str(),
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
    let qr = QuotaRequest::new(&pool_name, &group, &create.name, capacity_kb);

    if !state.ledger.approve(&qr, cap).await? {
        info!(group = %group, pool = %pool_name, volume = %create.name, "create denied: quota exceeded");
        return Err(ApiError::InsufficientStorage);
    }

    let credential = state
        .session_credential(SystemType::PowerFlex, &system_id, &system)
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
        // Accounting failures after a successful create are an operator
        // problem, not the client's; the sweeper reconciles.
        if let Err(e) = state.ledger.publish_created(&qr).await {
            error!(error = %e, volume = %create.name, "failed to commit reservation");
        }
    } else {
        warn!(status = %upstream.status, volume = %create.name,
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

    let vendor = state.vendor(SystemType::PowerFlex, &system_id, &system)?;
    let volume = vendor.resolve_volume(&volume_id).await?;
    let pool_name = state
        .pool_name(SystemType::PowerFlex, &system_id, &system, &volume.pool_id)
        .await?;

    let decision: VolumeDecision = state
        .policy
        .decide_as(
            DELETE_POLICY,
            json!({"token": {"group": claims.group, "role": claims.role}}),
        )
        .await?;
    let group = super::require_allowed(&decision).map(|g| {
        if g.is_empty() { claims.group.clone() } else { g }
    })?;

    let qr = QuotaRequest::new(&pool_name, &group, &volume.name, 0);
    state.ledger.delete_request(&qr).await?;

    let credential = state
        .session_credential(SystemType::PowerFlex, &system_id, &system)
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
    fn test_remove_volume_target() {
        assert_eq!(
            remove_volume_target("/api/instances/Volume::abc12/action/removeVolume"),
            Some("abc12")
        );
        assert_eq!(
            remove_volume_target("/api/instances/Volume::/action/removeVolume"),
            None
        );
        assert_eq!(remove_volume_target("/api/instances/Volume::abc12"), None);
        assert_eq!(remove_volume_target("/api/types/Volume/instances"), None);
    }

    #[test]
    fn test_create_body_decodes_wire_names() {
        let body: CreateVolumeBody = serde_json::from_str(
            r#"{"volumeSizeInKb": "8388608", "storagePoolId": "SP1", "name": "vol1", "extra": 1}"#,
        )
        .unwrap();
        assert_eq!(body.volume_size_in_kb, "8388608");
        assert_eq!(body.storage_pool_id, "SP1");
        assert_eq!(body.name, "vol1");
    }
}

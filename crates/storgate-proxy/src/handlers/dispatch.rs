//! Per-system dispatch for the mediated array surface.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use storgate_core::{StorageSystem, SystemType};

use crate::errors::ApiError;
use crate::forward::{self, BODY_LIMIT};
use crate::state::AppState;

/// Fallback handler for every request that is not a `/proxy/` endpoint.
///
/// The CSI sidecar names the intended array in the `Forwarded` header
/// (`for=<type>;<system_id>`); the mediator resolves the registered system
/// and hands the request to that family's handler.
pub async fn handle(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (system_type, system_id) = system_target(request.headers())?;
    let system = state
        .config
        .get_storage(system_type, &system_id)
        .ok_or_else(|| {
            ApiError::bad_gateway(format!(
                "storage system {system_type}/{system_id} is not registered"
            ))
        })?;

    match system_type {
        SystemType::PowerFlex => super::powerflex::handle(state, system_id, system, request).await,
        SystemType::PowerMax => super::powermax::handle(state, system_id, system, request).await,
        SystemType::PowerScale => {
            super::powerscale::handle(state, system_id, system, request).await
        }
    }
}

/// Parses the `Forwarded: for=<type>;<system_id>` pair.
pub fn system_target(headers: &HeaderMap) -> Result<(SystemType, String), ApiError> {
    let header = headers
        .get("forwarded")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing Forwarded header"))?;

    let mut parts = header.split(';').map(str::trim);
    let system_type = parts
        .next()
        .and_then(|p| p.strip_prefix("for="))
        .ok_or_else(|| ApiError::bad_request("Forwarded header is missing for=<system type>"))?
        .parse::<SystemType>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let system_id = parts
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Forwarded header is missing the system id"))?;

    Ok((system_type, system_id.to_string()))
}

/// Forwards a request untouched apart from credential substitution.
/// Shared by every handler's default arm.
pub async fn passthrough(
    state: &AppState,
    system_type: SystemType,
    system_id: &str,
    system: &StorageSystem,
    request: Request,
) -> Result<Response, ApiError> {
    let credential = state
        .session_credential(system_type, system_id, system)
        .await?;

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable request body: {e}")))?;

    let upstream = forward::forward(
        state,
        system_id,
        system,
        &credential,
        parts.method,
        &forward::path_and_query(&parts.uri),
        &parts.headers,
        body,
    )
    .await?;

    Ok(upstream.into_response())
}

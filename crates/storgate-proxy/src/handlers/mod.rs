//! Route assembly and the per-array handlers.

pub mod dispatch;
pub mod powerflex;
pub mod powermax;
pub mod powerscale;
pub mod refresh;
pub mod roles;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use axum::extract::Request;
use storgate_policy::VolumeDecision;
use storgate_token::Claims;

use crate::errors::ApiError;
use crate::middleware::{auth, policy_gate, request_id};
use crate::state::AppState;

/// The claims the authentication middleware attached.
pub(crate) fn claims_of(request: &Request) -> Result<Claims, ApiError> {
    request
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::internal("request reached handler without claims"))
}

/// Maps a volume decision to the tenant group it authorizes. Denials with
/// a stated reason are a 400, denials with no tenant group a 401, anything
/// else a 500.
pub(crate) fn require_allowed(decision: &VolumeDecision) -> Result<String, ApiError> {
    if decision.response.allowed {
        return Ok(decision.token.group.clone());
    }

    let reason = decision.response.status.reason.trim();
    if !reason.is_empty() {
        Err(ApiError::bad_request(reason))
    } else if decision.token.group.is_empty() {
        Err(ApiError::unauthorized("request denied"))
    } else {
        Err(ApiError::internal("request denied by policy"))
    }
}

/// Builds the full application router.
///
/// - `/proxy/refresh-token/` is open (its inputs are the tokens themselves);
/// - `/proxy/roles/` requires a valid bearer token;
/// - everything else is the mediated array surface: authenticated, URL-
///   authorized, then dispatched to the per-array handler.
pub fn router(state: AppState) -> Router {
    let authenticate = axum::middleware::from_fn_with_state(state.clone(), auth::authenticate);
    let authorize_url =
        axum::middleware::from_fn_with_state(state.clone(), policy_gate::authorize_url);

    // Layer order is inside-out: authentication runs before URL
    // authorization.
    let mediated = Router::new()
        .fallback(dispatch::handle)
        .layer(authorize_url)
        .layer(authenticate.clone());

    Router::new()
        .route(
            "/proxy/refresh-token/",
            get(refresh::handle).post(refresh::handle),
        )
        .route("/proxy/roles/", get(roles::handle).route_layer(authenticate))
        .merge(mediated)
        .layer(axum::middleware::from_fn(request_id::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

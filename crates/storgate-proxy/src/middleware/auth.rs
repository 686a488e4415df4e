//! Bearer token authentication middleware.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::ApiError;
use crate::state::AppState;

/// The validated raw bearer token, kept for policy inputs downstream.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Requires `Authorization: Bearer <token>` with a token the authority
/// accepts.
///
/// Missing header or a non-Bearer scheme is a 400; a token that fails
/// validation is a 401; a valid token whose group is denied is a 403. On
/// success the claims and raw token land in the request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| ApiError::bad_request("Authorization scheme must be Bearer"))?;

    let claims = state.tokens.validate(&token)?;

    if state.tokens.is_denied(&claims.group).await? {
        tracing::warn!(group = %claims.group, "request from denied tenant");
        return Err(ApiError::forbidden("tenant is denied"));
    }

    tracing::debug!(group = %claims.group, role = %claims.role, "token validated");

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(BearerToken(token));

    Ok(next.run(request).await)
}

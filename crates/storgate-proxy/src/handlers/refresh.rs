//! The refresh-token exchange endpoint.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// `GET /proxy/refresh-token/` — exchanges an expired access token and a
/// live refresh token for a fresh access token. All the authentication is
/// in the tokens themselves, so the route carries no bearer middleware.
#[instrument(skip_all)]
pub async fn handle(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let access_token = state
        .tokens
        .refresh(&body.access_token, &body.refresh_token)
        .await?;
    Ok(Json(RefreshResponse { access_token }))
}

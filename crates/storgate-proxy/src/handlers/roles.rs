//! The roles document endpoint.

use axum::Json;
use axum::extract::State;

use crate::state::AppState;

/// `GET /proxy/roles/` — the current roles document. Requires a valid
/// bearer token; served from the live config snapshot.
pub async fn handle(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.config.roles_document())
}

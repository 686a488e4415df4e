//! Coarse per-URL authorization against the decision engine.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;

use storgate_policy::{URL_POLICY, UrlDecision};

use crate::errors::ApiError;
use crate::pathclean::clean_path;
use crate::state::AppState;

/// Asks the decision engine whether `(method, path)` may proceed at all.
///
/// A denial is a uniform 404 — the proxy does not reveal whether the URL
/// exists. An unreachable engine is a 500; no request proceeds without a
/// decision.
pub async fn authorize_url(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().as_str().to_string();
    let url = clean_path(request.uri().path());

    let decision: UrlDecision = state
        .policy
        .decide_as(URL_POLICY, json!({"method": method, "url": url}))
        .await?;

    if !decision.allow {
        tracing::debug!(method, url, "url authorization denied");
        return Err(ApiError::NotFound);
    }

    Ok(next.run(request).await)
}

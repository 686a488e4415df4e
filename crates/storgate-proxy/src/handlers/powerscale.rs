//! PowerScale mediation.
//!
//! No quota accounting by contract (powerscale role quotas are zero). The
//! mediator intercepts client session creation and otherwise passes the
//! cluster's REST surface through with credential substitution.

use axum::Json;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use storgate_core::{StorageSystem, SystemType};

use crate::errors::ApiError;
use crate::forward;
use crate::state::AppState;

use super::dispatch::passthrough;

const SESSION_PATH: &str = "/session/1/session";

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

    if request.method() == Method::POST && path == SESSION_PATH {
        return Ok(intercept_session());
    }

    passthrough(&state, SystemType::PowerScale, &system_id, &system, request).await
}

/// Client session creation never reaches the cluster; the proxy answers
/// with an inert session so driver login loops succeed.
fn intercept_session() -> Response {
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, "isisessid=storgate-proxy; path=/")],
        Json(json!({"services": ["platform", "namespace"]})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intercept_session_sets_inert_cookie() {
        let response = intercept_session();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("isisessid="));
    }
}

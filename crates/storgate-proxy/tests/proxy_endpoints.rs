//! End-to-end tests of the mediation chain with a mock decision engine and
//! a mock array.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storgate_config::{ConfigStore, FileConfigStore};
use storgate_ledger::QuotaLedger;
use storgate_policy::PolicyClient;
use storgate_proxy::AppState;
use storgate_proxy::handlers;
use storgate_store::{KvStore, MemoryKvStore};
use storgate_token::{Claims, TokenAuthority, TokenConfig};

const SECRET: &[u8] = b"integration-test-secret";
const SYSTEM_ID: &str = "542a2d5f5122210f";

struct Harness {
    router: Router,
    store: Arc<MemoryKvStore>,
    tokens: Arc<TokenAuthority>,
    // Keep the temp files alive for the test's duration.
    _files: (NamedTempFile, NamedTempFile),
}

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn harness(opa: &MockServer, array: &MockServer) -> Harness {
    let store = Arc::new(MemoryKvStore::new());
    let tokens = Arc::new(TokenAuthority::new(
        SECRET,
        TokenConfig::default(),
        store.clone(),
    ));

    let storage = write_file(&format!(
        r#"{{"storage": {{"powerflex": {{"{SYSTEM_ID}": {{
            "endpoint": "{}", "user": "admin", "password": "secret", "insecure": true
        }}}}}}}}"#,
        array.uri()
    ));
    let roles = write_file(&format!(
        r#"{{"roles": {{"bronze": {{"system_types": {{"powerflex": {{"system_ids": {{"{SYSTEM_ID}": {{
            "pool_quotas": {{"bronze": 16777216}}
        }}}}}}}}}}}}}}"#
    ));

    let config_store =
        FileConfigStore::load(storage.path(), roles.path(), store.clone()).unwrap();

    let state = AppState::new(
        tokens.clone(),
        PolicyClient::with_defaults(&opa.uri()).unwrap(),
        QuotaLedger::new(store.clone()),
        config_store as Arc<dyn ConfigStore>,
        Duration::from_secs(5),
        Duration::from_secs(300),
        Duration::from_secs(10),
    )
    .unwrap();

    Harness {
        router: handlers::router(state),
        store,
        tokens,
        _files: (storage, roles),
    }
}

async fn mount_url_allow(opa: &MockServer, allow: bool) {
    Mock::given(method("POST"))
        .and(path("/v1/data/karavi/authz/url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"allow": allow}
        })))
        .mount(opa)
        .await;
}

async fn mount_create_decision(opa: &MockServer, quota: i64) {
    Mock::given(method("POST"))
        .and(path("/v1/data/karavi/volumes/create"))
        .and(body_partial_json(json!({"input": {"storagepool": "bronze"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "response": {"allowed": true, "status": {"reason": ""}},
                "token": {"group": "alice"},
                "quota": quota
            }
        })))
        .mount(opa)
        .await;
}

async fn mount_array(array: &MockServer, expect_create: u64) {
    Mock::given(method("GET"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json("arraytoken"))
        .mount(array)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/instances/StoragePool::SP1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "bronze"})))
        .mount(array)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/types/Volume/instances/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vol-id-1"})))
        .expect(expect_create)
        .mount(array)
        .await;
}

async fn mint_access(harness: &Harness) -> String {
    harness
        .tokens
        .mint("alice", "bronze")
        .await
        .unwrap()
        .access
}

fn expired_access(harness: &Harness) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    harness
        .tokens
        .sign(&Claims {
            iss: "storgate".to_string(),
            aud: "storgate".to_string(),
            sub: "alice".to_string(),
            exp: now - 120,
            iat: now - 600,
            role: "bronze".to_string(),
            group: "alice".to_string(),
        })
        .unwrap()
}

fn create_request(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/types/Volume/instances/")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"volumeSizeInKb": "8388608", "storagePoolId": "SP1", "name": "vol1"}"#,
        ))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_happy_create_accounts_quota() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;
    mount_create_decision(&opa, 16_777_216).await;
    mount_array(&array, 1).await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let response = harness
        .router
        .clone()
        .oneshot(create_request(&token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"id": "vol-id-1"}));

    // Ledger: one created entry, usage committed.
    let entry = harness
        .store
        .get("quota:bronze:alice:vol1")
        .await
        .unwrap()
        .expect("ledger entry");
    let entry: Value = serde_json::from_str(&entry).unwrap();
    assert_eq!(entry["state"], "created");
    assert_eq!(
        harness
            .store
            .get("quota:bronze:alice:used")
            .await
            .unwrap()
            .as_deref(),
        Some("8388608")
    );
}

#[tokio::test]
async fn test_quota_exceeded_never_reaches_upstream() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;
    // Cap below the requested 8388608 KB.
    mount_create_decision(&opa, 8_000_000).await;
    mount_array(&array, 0).await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let response = harness
        .router
        .clone()
        .oneshot(create_request(&token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);

    let body = body_json(response).await;
    assert_eq!(body["errorCode"], 507);
    assert_eq!(body["httpStatusCode"], 507);
    assert_eq!(body["message"], "request denied");

    assert_eq!(
        harness.store.get("quota:bronze:alice:vol1").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_denied_url_is_uniform_404() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, false).await;
    mount_array(&array, 0).await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/admin/whatever")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // No ledger side effects.
    assert!(
        harness
            .store
            .keys_with_prefix("quota:")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_policy_engine_down_is_500() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&opa)
        .await;
    mount_array(&array, 0).await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let response = harness
        .router
        .clone()
        .oneshot(create_request(&token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_missing_bearer_is_400_and_bad_token_is_401() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;

    let harness = harness(&opa, &array).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/version")
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("GET")
        .uri("/api/version")
        .header(header::AUTHORIZATION, "Basic abc")
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("GET")
        .uri("/api/version")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_denied_tenant_is_403_everywhere() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;
    harness.store.set_add("tenant:deny", "alice").await.unwrap();

    let response = harness
        .router
        .clone()
        .oneshot(create_request(&token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_refresh_happy_path() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;

    let harness = harness(&opa, &array).await;
    let pair = harness.tokens.mint("alice", "bronze").await.unwrap();
    let stale = expired_access(&harness);

    let request = Request::builder()
        .method("GET")
        .uri("/proxy/refresh-token/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"accessToken": stale, "refreshToken": pair.refresh}).to_string(),
        ))
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let new_access = body["accessToken"].as_str().unwrap();
    let claims = harness.tokens.validate(new_access).unwrap();
    assert_eq!(claims.group, "alice");
    assert_eq!(claims.role, "bronze");

    let record: Value = serde_json::from_str(
        &harness.store.get("tenant:alice").await.unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(record["refresh_count"], 1);
}

#[tokio::test]
async fn test_refresh_of_valid_access_is_400() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;

    let harness = harness(&opa, &array).await;
    let pair = harness.tokens.mint("alice", "bronze").await.unwrap();

    let request = Request::builder()
        .method("GET")
        .uri("/proxy/refresh-token/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"accessToken": pair.access, "refreshToken": pair.refresh}).to_string(),
        ))
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("access token was valid")
    );
}

#[tokio::test]
async fn test_roles_endpoint_serves_document() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let request = Request::builder()
        .method("GET")
        .uri("/proxy/roles/")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["roles"]["bronze"].is_object());

    // Unauthenticated access is refused.
    let request = Request::builder()
        .method("GET")
        .uri("/proxy/roles/")
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_is_intercepted() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;
    // No /api/login mock on the array side: reaching it would 404 the test.

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/login")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // The inert token is a JSON string, like the array's own reply.
    assert!(body_json(response).await.is_string());
}

#[tokio::test]
async fn test_unknown_system_is_rejected_before_forward() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/version")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("forwarded", "for=powerflex;doesnotexist")
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_passthrough_substitutes_credentials() {
    let opa = MockServer::start().await;
    let array = MockServer::start().await;
    mount_url_allow(&opa, true).await;
    Mock::given(method("GET"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json("arraytoken"))
        .mount(&array)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .and(wiremock::matchers::header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json("4.0"))
        .expect(1)
        .mount(&array)
        .await;

    let harness = harness(&opa, &array).await;
    let token = mint_access(&harness).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/version")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("forwarded", format!("for=powerflex;{SYSTEM_ID}"))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!("4.0"));
}

#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use cohort_api::auth::{Claims, Identity, Role};
use cohort_api::config::AppConfig;
use cohort_api::{app, AppState};

pub const SECRET: &str = "integration-test-secret";

/// Development defaults pointed at a database that is never there, so
/// anything reaching the pool fails fast with a connection error.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.access_token_secret = SECRET.to_string();
    config.security.cors_origins = Vec::new();
    config.api.enable_request_logging = false;
    config.database.host = "127.0.0.1".to_string();
    config.database.port = 1;
    config.database.acquire_timeout_secs = 1;
    config
}

pub fn test_state() -> AppState {
    AppState::new(test_config())
}

pub fn router(state: &AppState) -> Router {
    app(state.clone())
}

pub fn token_for(state: &AppState, user_id: u64, role: Role) -> String {
    state.tokens.issue(Identity::new(user_id, role)).expect("issue token")
}

pub fn expired_token_for(state: &AppState, user_id: u64, role: Role) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        identity: Identity::new(user_id, role),
        iat: now - 7200,
        exp: now - 3600,
    };
    state.tokens.encode(&claims).expect("encode claims")
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = tokio::time::timeout(Duration::from_secs(10), router.oneshot(request))
        .await
        .expect("request timed out")
        .expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse { status, headers, body }
}

/// MySQL URL for the end-to-end tests, or `None` to skip them.
pub fn mysql_url() -> Option<String> {
    std::env::var("COHORT_TEST_DATABASE_URL").ok().filter(|v| !v.is_empty())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

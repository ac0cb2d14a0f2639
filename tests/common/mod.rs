#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    body::Body,
    http::Request,
    routing::get,
};
use httpmock::MockServer;
use jsonwebtoken::{EncodingKey, Header};
use platter::auth::{AccessClaims, CurrentUser, MemorySessionStore, Session, Vault};
use platter::{ServerConfig, create_app_with_store};
use url::Url;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-at-least-32-bytes!!";
pub const VAULT_KEY: [u8; 32] = *b"test-vault-key-exactly-32-bytes!";

pub const SESSION_LIFETIME_SECS: u64 = 604_800;
pub const REFRESH_COOKIE_MAX_AGE_SECS: u64 = 5_184_000;

pub struct TestApp {
    pub app: Router,
    pub sessions: Arc<MemorySessionStore>,
}

/// Build the app against a mock identity provider, with one protected
/// business route standing in for the out-of-scope admin pages.
pub fn test_app(server: &MockServer) -> TestApp {
    test_app_with_url(&server.base_url())
}

/// Same, but against an arbitrary (possibly unreachable) identity URL.
pub fn test_app_with_url(identity_url: &str) -> TestApp {
    let sessions = Arc::new(MemorySessionStore::new());
    let config = ServerConfig {
        identity_url: Url::parse(identity_url).expect("Invalid identity URL"),
        identity_api_key: None,
        jwt_secret: JWT_SECRET.to_vec(),
        vault_key: VAULT_KEY,
        login_path: "/login".to_string(),
        secure_cookies: false,
        session_lifetime_secs: SESSION_LIFETIME_SECS,
        refresh_cookie_max_age_secs: REFRESH_COOKIE_MAX_AGE_SECS,
        http_timeout_secs: 2,
    };

    let protected = Router::new().route("/api/orders", get(list_orders));
    let app = create_app_with_store(&config, protected, sessions.clone());

    TestApp { app, sessions }
}

async fn list_orders(CurrentUser(principal): CurrentUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "orders": [], "user": principal.id }))
}

/// Sign an access token the way the identity provider would.
pub fn make_access_token(sub: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = AccessClaims {
        sub: sub.to_string(),
        exp: (now + exp_offset) as u64,
        email: Some("alice@example.com".to_string()),
        role: Some("authenticated".to_string()),
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET)).unwrap()
}

/// Seal a refresh secret the way the login flow would for a cookie.
pub fn encrypt_refresh(secret: &str) -> String {
    Vault::new(VAULT_KEY).encrypt(secret).unwrap()
}

pub fn decrypt_refresh(blob: &str) -> String {
    Vault::new(VAULT_KEY).decrypt(blob).unwrap()
}

/// Seed a session directly in the store, as an earlier login would have.
pub fn seed_session(app: &TestApp, access_token: &str, refresh_token: Option<&str>) -> String {
    use platter::auth::SessionStore;
    app.sessions.create(Session {
        access_token: access_token.to_string(),
        user_id: "user-1".to_string(),
        refresh_token: refresh_token.map(|s| s.to_string()),
    })
}

pub fn get_request(path: &str, cookie: Option<&str>, xhr: bool) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    if xhr {
        builder = builder.header("x-requested-with", "XMLHttpRequest");
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json_request(path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_request(path: &str, cookie: Option<&str>, xhr: bool) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    if xhr {
        builder = builder.header("x-requested-with", "XMLHttpRequest");
    }
    builder.body(Body::empty()).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=", cookie_name)) && c.contains("Max-Age=0"))
}

/// The (non-empty) value a Set-Cookie header assigns to the named cookie.
pub fn cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let (name, value) = c.split(';').next()?.split_once('=')?;
        (name == cookie_name && !value.is_empty()).then(|| value.to_string())
    })
}

pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

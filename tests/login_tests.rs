//! Tests for the login-flow boundary endpoints.
//!
//! Tests cover:
//! - Login with and without remember-me, and the resulting cookie shapes
//! - Principal fetch when the password grant omits the user record
//! - Invalid credentials and unreachable-provider failures
//! - The protected /auth/me endpoint behind the gate
//! - Logout: local state always cleared, whatever the upstream says

mod common;

use axum::http::{StatusCode, header};
use common::*;
use httpmock::prelude::*;
use platter::auth::SessionStore;
use serde_json::json;
use tower::ServiceExt;

fn principal_json() -> serde_json::Value {
    json!({
        "id": "user-1",
        "email": "alice@example.com",
        "role": "authenticated"
    })
}

fn grant_json(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-secret-1",
        "expires_in": 3600,
        "user": principal_json()
    })
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_with_remember_me_sets_persistent_cookies() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);
    let access = make_access_token("user-1", 3600);

    let grant_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password");
            then.status(200).json_body(grant_json(&access));
        })
        .await;

    let response = t
        .app
        .clone()
        .oneshot(post_json_request(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "hunter2", "remember_me": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    grant_mock.assert_async().await;

    let cookies = extract_set_cookies(&response);
    let id = cookie_value(&cookies, "session_id").expect("Session cookie");
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("session_id=") && c.contains("Max-Age=604800")),
        "Remember-me session cookie must be persistent"
    );

    let blob = cookie_value(&cookies, "refresh_token").expect("Refresh cookie");
    assert_eq!(decrypt_refresh(&blob), "refresh-secret-1");
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("refresh_token=") && c.contains("Max-Age=5184000"))
    );
    for cookie in &cookies {
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(
            !cookie.contains("refresh-secret-1"),
            "Refresh secret never travels in plaintext"
        );
    }

    let session = t.sessions.load(&id).expect("Session established");
    assert_eq!(session.access_token, access);
    assert_eq!(session.user_id, "user-1");
    assert!(
        session.refresh_token.is_none(),
        "Remembered credential lives in the cookie, not the store"
    );

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["id"], "user-1");
}

#[tokio::test]
async fn test_login_without_remember_me_keeps_secret_server_side() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);
    let access = make_access_token("user-1", 3600);

    let _grant_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password");
            then.status(200).json_body(grant_json(&access));
        })
        .await;

    let response = t
        .app
        .clone()
        .oneshot(post_json_request(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "hunter2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let id = cookie_value(&cookies, "session_id").expect("Session cookie");
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("session_id=") && !c.contains("Max-Age")),
        "Session cookie must die with the browser session"
    );
    assert!(cookie_value(&cookies, "refresh_token").is_none());

    let session = t.sessions.load(&id).expect("Session established");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-secret-1"));
}

#[tokio::test]
async fn test_login_fetches_principal_when_grant_omits_user() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);
    let access = make_access_token("user-1", 3600);

    let _grant_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password");
            then.status(200).json_body(json!({
                "access_token": access,
                "refresh_token": "refresh-secret-1",
                "expires_in": 3600
            }));
        })
        .await;
    let user_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/auth/v1/user");
            then.status(200).json_body(principal_json());
        })
        .await;

    let response = t
        .app
        .clone()
        .oneshot(post_json_request(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "hunter2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    user_mock.assert_async().await;

    let body = body_json(response).await;
    assert_eq!(body["user"]["id"], "user-1");
}

#[tokio::test]
async fn test_login_with_invalid_credentials_rejected() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);

    let _grant_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password");
            then.status(400)
                .json_body(json!({ "error": "invalid_grant", "error_description": "wrong password" }));
        })
        .await;

    let response = t
        .app
        .clone()
        .oneshot(post_json_request(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());

    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_credentials");
    // Provider error detail stays server-side
    assert_ne!(body["message"], "wrong password");
}

#[tokio::test]
async fn test_login_with_unreachable_provider_is_bad_gateway() {
    let t = test_app_with_url("http://127.0.0.1:9");

    let response = t
        .app
        .clone()
        .oneshot(post_json_request(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "hunter2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = body_json(response).await;
    assert_eq!(body["error"], "identity_unavailable");
}

// =============================================================================
// Current User
// =============================================================================

#[tokio::test]
async fn test_me_returns_attached_principal() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);
    let access = make_access_token("user-1", 300);
    let id = seed_session(&t, &access, None);

    let _user_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/auth/v1/user");
            then.status(200).json_body(principal_json());
        })
        .await;

    let response = t
        .app
        .clone()
        .oneshot(get_request(
            "/auth/me",
            Some(&format!("session_id={}", id)),
            true,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["id"], "user-1");
    assert_eq!(body["email"], "alice@example.com");
}

#[tokio::test]
async fn test_me_without_session_redirects_browser() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);

    let response = t
        .app
        .clone()
        .oneshot(get_request("/auth/me", None, false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(location, "/login?next=%2Fauth%2Fme");
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout_revokes_upstream_and_destroys_session() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);
    let access = make_access_token("user-1", 300);
    let id = seed_session(&t, &access, None);

    let revoke_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/logout")
                .header("authorization", format!("Bearer {}", access));
            then.status(204);
        })
        .await;

    let response = t
        .app
        .clone()
        .oneshot(post_request(
            "/auth/logout",
            Some(&format!("session_id={}", id)),
            true,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    revoke_mock.assert_async().await;

    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "session_id"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
    assert!(t.sessions.load(&id).is_none());

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_logout_with_unreachable_provider_still_clears_locally() {
    let t = test_app_with_url("http://127.0.0.1:9");
    let access = make_access_token("user-1", 300);
    let id = seed_session(&t, &access, None);

    let response = t
        .app
        .clone()
        .oneshot(post_request(
            "/auth/logout",
            Some(&format!("session_id={}", id)),
            true,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "session_id"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
    assert!(t.sessions.load(&id).is_none(), "Local state cleared regardless");
}

#[tokio::test]
async fn test_logout_redirects_browser_to_login() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);

    let response = t
        .app
        .clone()
        .oneshot(post_request("/auth/logout", None, false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(location, "/login");

    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "session_id"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
}

#[tokio::test]
async fn test_logout_without_session_is_idempotent() {
    let server = MockServer::start_async().await;
    let t = test_app(&server);

    let response = t
        .app
        .clone()
        .oneshot(post_request("/auth/logout", None, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

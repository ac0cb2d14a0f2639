//! Login-flow HTTP endpoints.
//!
//! - POST `/login` - Exchange credentials upstream and establish a session
//! - POST `/logout` - Revoke upstream (best-effort) and clear local state
//! - GET `/me` - Return the authenticated principal (behind the gate)

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::error;

use super::client::Principal;
use super::layer::{AuthState, CurrentUser, require_auth};
use super::respond::ClientKind;

pub fn router(state: AuthState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
    #[serde(default)]
    remember_me: bool,
}

enum LoginError {
    InvalidCredentials,
    Upstream,
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            LoginError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password",
            ),
            LoginError::Upstream => (
                StatusCode::BAD_GATEWAY,
                "identity_unavailable",
                "Authentication service unavailable",
            ),
        };
        (
            status,
            Json(serde_json::json!({ "error": error, "message": message })),
        )
            .into_response()
    }
}

/// Sign in against the identity provider and establish a local session.
/// With `remember_me` the refresh credential travels in an encrypted
/// long-lived cookie; otherwise it stays server-side and the session ends
/// with the browser.
async fn login(
    State(state): State<AuthState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, LoginError> {
    let pair = state
        .gate
        .identity()
        .sign_in(&body.email, &body.password)
        .await
        .map_err(|e| {
            if e.is_rejection() {
                LoginError::InvalidCredentials
            } else {
                error!(error = %e, "Sign-in call failed");
                LoginError::Upstream
            }
        })?;

    let outcome = state.gate.establish(pair, body.remember_me).await.map_err(|kind| {
        error!(reason = %kind, "Failed to establish session after sign-in");
        LoginError::Upstream
    })?;

    let cookies: Vec<_> = outcome
        .cookies
        .into_iter()
        .map(|c| (header::SET_COOKIE, c))
        .collect();

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(serde_json::json!({ "success": true, "user": outcome.principal })),
    ))
}

/// Logout always clears local state, whatever the upstream call did.
/// Browsers land back on the login page; machine clients get JSON.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let client = ClientKind::classify(&headers);
    let cookies = state.gate.sign_out(&headers).await;

    let mut response = match client {
        ClientKind::MachineClient => {
            (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
        }
        ClientKind::Browser => {
            let mut response = StatusCode::FOUND.into_response();
            if let Ok(value) = header::HeaderValue::from_str(&state.login_path) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            response
        }
    };

    let response_headers = response.headers_mut();
    for cookie in &cookies {
        if let Ok(value) = header::HeaderValue::from_str(cookie) {
            response_headers.append(header::SET_COOKIE, value);
        }
    }

    response
}

async fn me(CurrentUser(principal): CurrentUser) -> Json<Principal> {
    Json(principal)
}

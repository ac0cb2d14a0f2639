//! Axum wiring for the authentication gate.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::client::Principal;
use super::gate::AuthGate;
use super::respond::{ClientKind, UnauthorizedResponse};

/// Shared state for the middleware and the auth handlers.
#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<AuthGate>,
    pub login_path: String,
    pub secure_cookies: bool,
}

/// Middleware gating every protected request.
///
/// Runs one pass of the gate, attaches the principal for downstream
/// handlers, forwards, and appends any rotated credential cookies to the
/// response. Failures short-circuit into the client-appropriate
/// unauthorized response.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = ClientKind::classify(request.headers());
    let original_path = request.uri().path().to_string();

    match state.gate.authenticate(request.headers()).await {
        Ok(outcome) => {
            request.extensions_mut().insert(outcome.principal);

            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            for cookie in &outcome.cookies {
                if let Ok(value) = header::HeaderValue::from_str(cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
            response
        }
        Err(kind) => UnauthorizedResponse {
            kind,
            client,
            login_path: state.login_path.clone(),
            original_path: Some(original_path),
            secure_cookies: state.secure_cookies,
        }
        .into_response(),
    }
}

/// Extractor handing the authenticated principal to handlers.
/// Only works behind [`require_auth`]; elsewhere it is a server error,
/// never a silent pass.
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Principal>() {
            Some(principal) => Ok(CurrentUser(principal.clone())),
            None => {
                tracing::error!("CurrentUser used on a route without the auth layer");
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

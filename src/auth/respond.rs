//! Failure classification and unauthorized responses.
//!
//! Machine clients get a structured 401; full-page browser navigations get
//! a 302 to the login entry point with the original path preserved. Both
//! clear the auth cookies. Messages stay generic so upstream error detail
//! never reaches the client.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::{REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME, clear_cookie};

/// What kind of caller made the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Full-page browser navigation; expects redirects
    Browser,
    /// Script or async fetch; expects structured status codes
    MachineClient,
}

impl ClientKind {
    /// Classify the caller from its request headers. The conventional
    /// async-call marker is `X-Requested-With: XMLHttpRequest`; anything
    /// else is treated as browser navigation.
    pub fn classify(headers: &axum::http::HeaderMap) -> Self {
        let marker = headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
            .unwrap_or(false);

        if marker {
            ClientKind::MachineClient
        } else {
            ClientKind::Browser
        }
    }
}

/// Why a request failed to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No session and no refresh credential anywhere
    TokenAbsent,
    /// Access token expired by local inspection; triggers a refresh attempt
    TokenExpiredLocal,
    /// Verification call returned no principal; triggers a refresh attempt
    TokenInvalidRemote,
    /// Session exists but no refresh credential was found
    RefreshCredentialAbsent,
    /// Refresh credential failed decryption; treated as absent
    RefreshCredentialCorrupt,
    /// Upstream explicitly refused the refresh secret
    RefreshRejected,
    /// Refresh failed for transport reasons; denied all the same
    RefreshTransportFailure,
    /// Refresh succeeded but the new token could not be verified
    PostRefreshVerificationFailure,
}

impl AuthErrorKind {
    /// Generic client-facing message. Never includes upstream error text.
    pub fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::TokenAbsent => "Not authenticated",
            AuthErrorKind::TokenExpiredLocal
            | AuthErrorKind::RefreshCredentialAbsent
            | AuthErrorKind::RefreshCredentialCorrupt
            | AuthErrorKind::RefreshRejected => "Session expired",
            AuthErrorKind::TokenInvalidRemote => "Session is no longer valid",
            AuthErrorKind::RefreshTransportFailure => "Authentication service unavailable",
            AuthErrorKind::PostRefreshVerificationFailure => "Session could not be renewed",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AuthErrorKind::TokenAbsent => "token_absent",
            AuthErrorKind::TokenExpiredLocal => "token_expired_local",
            AuthErrorKind::TokenInvalidRemote => "token_invalid_remote",
            AuthErrorKind::RefreshCredentialAbsent => "refresh_credential_absent",
            AuthErrorKind::RefreshCredentialCorrupt => "refresh_credential_corrupt",
            AuthErrorKind::RefreshRejected => "refresh_rejected",
            AuthErrorKind::RefreshTransportFailure => "refresh_transport_failure",
            AuthErrorKind::PostRefreshVerificationFailure => "post_refresh_verification_failure",
        };
        f.write_str(label)
    }
}

/// Terminal response for a request that failed authentication.
#[derive(Debug)]
pub struct UnauthorizedResponse {
    pub kind: AuthErrorKind,
    pub client: ClientKind,
    pub login_path: String,
    /// Originally requested path, preserved for post-login redirect
    pub original_path: Option<String>,
    pub secure_cookies: bool,
}

impl IntoResponse for UnauthorizedResponse {
    fn into_response(self) -> Response {
        use axum::Json;
        use axum::http::HeaderValue;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            message: &'static str,
        }

        let mut response = match self.client {
            ClientKind::MachineClient => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "unauthorized",
                    message: self.kind.message(),
                }),
            )
                .into_response(),
            ClientKind::Browser => {
                let location = match &self.original_path {
                    Some(path) => {
                        let next: String =
                            url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
                        format!("{}?next={}", self.login_path, next)
                    }
                    None => self.login_path.clone(),
                };
                let mut response = StatusCode::FOUND.into_response();
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
                response
            }
        };

        // Unauthorized is terminal: drop both cookies
        let headers = response.headers_mut();
        for cookie in [
            clear_cookie(SESSION_COOKIE_NAME, self.secure_cookies),
            clear_cookie(REFRESH_COOKIE_NAME, self.secure_cookies),
        ] {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(header::SET_COOKIE, value);
            }
        }

        response
    }
}

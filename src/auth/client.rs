//! Thin client for the upstream identity provider.
//!
//! The middleware needs four operations: verify an access token, exchange
//! a refresh secret for a new credential pair, best-effort sign-out, and
//! (for the login flow only) the password grant. Failures are classified
//! so the orchestrator can tell "the refresh secret itself was refused"
//! apart from transient transport trouble.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// User record returned by the identity provider for a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-side user id
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Credential pair issued by a password grant or a refresh. The access
/// token carries its own expiry claim, so the grant's advisory lifetime
/// fields are not kept.
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// User record, when the provider bundles it with the grant response
    #[serde(default)]
    pub user: Option<Principal>,
}

/// Errors from identity provider calls.
#[derive(Debug)]
pub enum IdentityError {
    /// HTTP client could not be constructed
    ClientBuild(reqwest::Error),
    /// The provider refused the credentials or grant (4xx)
    Rejected { status: u16 },
    /// The provider answered with an unexpected status (5xx and friends)
    Upstream { status: u16 },
    /// Network-level failure (DNS, connect, timeout)
    Transport(reqwest::Error),
    /// Response body could not be decoded
    Decode(reqwest::Error),
}

impl IdentityError {
    /// Whether the provider explicitly refused the presented credential,
    /// as opposed to failing for reasons that say nothing about it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, IdentityError::Rejected { .. })
    }
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::ClientBuild(e) => write!(f, "Failed to build HTTP client: {}", e),
            IdentityError::Rejected { status } => {
                write!(f, "Identity provider rejected the request ({})", status)
            }
            IdentityError::Upstream { status } => {
                write!(f, "Identity provider returned an unexpected status ({})", status)
            }
            IdentityError::Transport(e) => write!(f, "Identity provider unreachable: {}", e),
            IdentityError::Decode(e) => write!(f, "Failed to decode identity response: {}", e),
        }
    }
}

impl std::error::Error for IdentityError {}

/// HTTP client for the identity provider's auth endpoints.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl IdentityClient {
    /// Build a client with a hard request deadline. The timeout bounds every
    /// call the middleware can block on.
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(IdentityError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Password grant. Used by the login flow, never by the middleware.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenPair, IdentityError> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Exchange a refresh secret for a new credential pair.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair, IdentityError> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    /// Fetch the principal for an access token. Returns None on every
    /// failure class: the caller cannot distinguish expired, revoked and
    /// unreachable, and must treat them all as not authenticated.
    pub async fn verify_access_token(&self, access_token: &str) -> Option<Principal> {
        let request = self.with_api_key(
            self.client
                .get(format!("{}/auth/v1/user", self.base_url))
                .bearer_auth(access_token),
        );

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "Token verification transport failure");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Token verification refused");
            return None;
        }

        match response.json::<Principal>().await {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::debug!(error = %e, "Token verification returned malformed body");
                None
            }
        }
    }

    /// Best-effort upstream revocation. Callers swallow the error: sign-out
    /// must always clear local state whatever the provider says.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let request = self.with_api_key(
            self.client
                .post(format!("{}/auth/v1/logout", self.base_url))
                .bearer_auth(access_token),
        );

        let response = request.send().await.map_err(IdentityError::Transport)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(IdentityError::Rejected {
                status: status.as_u16(),
            })
        } else {
            Err(IdentityError::Upstream {
                status: status.as_u16(),
            })
        }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<TokenPair, IdentityError> {
        let request = self.with_api_key(
            self.client
                .post(format!("{}/auth/v1/token", self.base_url))
                .query(&[("grant_type", grant_type)])
                .json(&body),
        );

        let response = request.send().await.map_err(IdentityError::Transport)?;
        let status = response.status();

        if status.is_client_error() {
            return Err(IdentityError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(IdentityError::Upstream {
                status: status.as_u16(),
            });
        }

        response.json::<TokenPair>().await.map_err(IdentityError::Decode)
    }

    fn with_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }
}

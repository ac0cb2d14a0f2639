pub mod auth;
pub mod cli;

use std::sync::Arc;
use std::time::Duration;

use auth::{
    AuthGate, AuthState, GateSettings, IdentityClient, MemorySessionStore, SessionStore,
    TokenInspector, VAULT_KEY_LEN, Vault, require_auth,
};
use axum::{Router, middleware};
use url::Url;

pub struct ServerConfig {
    /// Base URL of the upstream identity provider
    pub identity_url: Url,
    /// Optional API key sent with every identity call
    pub identity_api_key: Option<String>,
    /// Shared secret verifying access-token signatures
    pub jwt_secret: Vec<u8>,
    /// Symmetric key sealing the refresh-credential cookie
    pub vault_key: [u8; VAULT_KEY_LEN],
    /// Where unauthenticated browsers are sent
    pub login_path: String,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Remember-me session cookie lifetime; 0 means browser-session-only
    pub session_lifetime_secs: u64,
    /// Refresh cookie lifetime
    pub refresh_cookie_max_age_secs: u64,
    /// Deadline for every identity provider call
    pub http_timeout_secs: u64,
}

/// Build the application router: auth endpoints under `/auth`, and the
/// caller's protected routes gated by the auth middleware. The protected
/// router carries the business pages and API of the host app, which this
/// crate treats as external collaborators.
pub fn create_app(config: &ServerConfig, protected: Router) -> Router {
    create_app_with_store(config, protected, Arc::new(MemorySessionStore::new()))
}

/// Same as [`create_app`] but with a caller-provided session store, for
/// hosts that keep session state somewhere other than process memory.
pub fn create_app_with_store(
    config: &ServerConfig,
    protected: Router,
    sessions: Arc<dyn SessionStore>,
) -> Router {
    let identity = IdentityClient::new(
        config.identity_url.clone(),
        config.identity_api_key.clone(),
        Duration::from_secs(config.http_timeout_secs),
    )
    .expect("Failed to build identity client");

    let gate = Arc::new(AuthGate::new(
        TokenInspector::new(&config.jwt_secret),
        Vault::new(config.vault_key),
        identity,
        sessions,
        GateSettings {
            secure_cookies: config.secure_cookies,
            session_lifetime_secs: config.session_lifetime_secs,
            refresh_cookie_max_age_secs: config.refresh_cookie_max_age_secs,
        },
    ));

    let state = AuthState {
        gate,
        login_path: config.login_path.clone(),
        secure_cookies: config.secure_cookies,
    };

    Router::new()
        .nest("/auth", auth::handlers::router(state.clone()))
        .merge(protected.layer(middleware::from_fn_with_state(state, require_auth)))
}

//! Per-request authentication orchestration.
//!
//! Every protected request runs one pass through [`AuthGate::authenticate`]:
//! validate the session's access token (locally first, then upstream),
//! fall back to a refresh with the stored credential when that fails, and
//! deny otherwise. A request either gets a fully refreshed session with a
//! principal attached or an error kind for the response layer; downstream
//! handlers never see a half-updated state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use tokio::sync::Mutex as AsyncMutex;

use super::claims::TokenInspector;
use super::client::{IdentityClient, Principal, TokenPair};
use super::cookie::{
    REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME, build_cookie, clear_cookie, get_cookie,
};
use super::respond::AuthErrorKind;
use super::session::{Session, SessionStore};
use super::vault::Vault;

/// Cookie lifetimes and flags the gate needs when rewriting credentials.
pub struct GateSettings {
    pub secure_cookies: bool,
    /// Session cookie lifetime for remember-me sessions; 0 means
    /// browser-session-only cookies even when remembered.
    pub session_lifetime_secs: u64,
    /// Refresh cookie lifetime (60 days by default).
    pub refresh_cookie_max_age_secs: u64,
}

/// Result of a successful gate pass.
pub struct AuthOutcome {
    pub principal: Principal,
    /// Session identifier after any regeneration.
    pub session_id: String,
    /// Set-Cookie values the response must carry (rotated credentials).
    pub cookies: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CredentialOrigin {
    Cookie,
    Session,
}

const MAX_GUARDS: usize = 256;

/// The authentication state machine shared by the middleware and the
/// login/logout handlers.
pub struct AuthGate {
    inspector: TokenInspector,
    vault: Vault,
    identity: IdentityClient,
    sessions: Arc<dyn SessionStore>,
    settings: GateSettings,
    /// Single-flight guards keyed by session id, so concurrent requests
    /// from one client perform at most one upstream refresh.
    refresh_guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AuthGate {
    pub fn new(
        inspector: TokenInspector,
        vault: Vault,
        identity: IdentityClient,
        sessions: Arc<dyn SessionStore>,
        settings: GateSettings,
    ) -> Self {
        Self {
            inspector,
            vault,
            identity,
            sessions,
            settings,
            refresh_guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }

    /// Run the gate for one request.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthOutcome, AuthErrorKind> {
        let session_id = get_cookie(headers, SESSION_COOKIE_NAME).map(str::to_string);
        let session = session_id.as_deref().and_then(|id| self.sessions.load(id));

        if let (Some(id), Some(session)) = (&session_id, &session) {
            match self.check_access(&session.access_token).await {
                Ok(principal) => {
                    return Ok(AuthOutcome {
                        principal,
                        session_id: id.clone(),
                        cookies: Vec::new(),
                    });
                }
                Err(kind) => {
                    tracing::debug!(reason = %kind, "Access credential unusable, attempting refresh");
                }
            }
        }

        self.refresh(headers, session_id, session).await
    }

    /// Create a session from a freshly issued credential pair (login flow).
    /// `remember` keeps the refresh credential in an encrypted cookie and
    /// makes the session cookie persistent; otherwise the secret stays
    /// server-side and the cookie dies with the browser session.
    pub async fn establish(
        &self,
        pair: TokenPair,
        remember: bool,
    ) -> Result<AuthOutcome, AuthErrorKind> {
        let principal = match pair.user.clone() {
            Some(user) => user,
            None => self
                .identity
                .verify_access_token(&pair.access_token)
                .await
                .ok_or(AuthErrorKind::PostRefreshVerificationFailure)?,
        };

        let session_id = self.sessions.create(Session {
            access_token: pair.access_token.clone(),
            user_id: principal.id.clone(),
            refresh_token: (!remember).then(|| pair.refresh_token.clone()),
        });

        let mut cookies = vec![self.session_cookie(&session_id, remember)];
        if remember {
            match self.vault.encrypt(&pair.refresh_token) {
                Ok(blob) => cookies.push(self.refresh_cookie(&blob)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to seal refresh credential");
                    return Err(self.fail(Some(&session_id), AuthErrorKind::PostRefreshVerificationFailure));
                }
            }
        }

        Ok(AuthOutcome {
            principal,
            session_id,
            cookies,
        })
    }

    /// Destroy the caller's session, best-effort revoking upstream first.
    /// Returns the Set-Cookie values that clear the auth cookies; upstream
    /// failures are swallowed because logout must always succeed locally.
    pub async fn sign_out(&self, headers: &HeaderMap) -> Vec<String> {
        if let Some(id) = get_cookie(headers, SESSION_COOKIE_NAME) {
            if let Some(session) = self.sessions.load(id) {
                if let Err(e) = self.identity.sign_out(&session.access_token).await {
                    tracing::debug!(error = %e, "Upstream sign-out failed; clearing local state anyway");
                }
            }
            self.sessions.destroy(id);
        }

        vec![
            clear_cookie(SESSION_COOKIE_NAME, self.settings.secure_cookies),
            clear_cookie(REFRESH_COOKIE_NAME, self.settings.secure_cookies),
        ]
    }

    async fn check_access(&self, access_token: &str) -> Result<Principal, AuthErrorKind> {
        if self.inspector.is_expired(access_token) {
            return Err(AuthErrorKind::TokenExpiredLocal);
        }

        // Local validity is only a fast path; revocation is server-side.
        self.identity
            .verify_access_token(access_token)
            .await
            .ok_or(AuthErrorKind::TokenInvalidRemote)
    }

    async fn refresh(
        &self,
        headers: &HeaderMap,
        session_id: Option<String>,
        session: Option<Session>,
    ) -> Result<AuthOutcome, AuthErrorKind> {
        let refresh_blob = get_cookie(headers, REFRESH_COOKIE_NAME);

        let guard_key = match (&session_id, refresh_blob) {
            (Some(id), _) => id.clone(),
            (None, Some(blob)) => anon_guard_key(blob),
            (None, None) => return Err(AuthErrorKind::TokenAbsent),
        };
        let guard = self.refresh_guard(&guard_key);
        let _flight = guard.lock().await;

        // A concurrent request may have refreshed and regenerated this
        // session while we waited; adopt its result instead of spending
        // the already-rotated secret.
        if let Some(old_id) = session_id.as_deref() {
            if let Some(adopted) = self.adopt_regenerated(old_id).await {
                return Ok(adopted);
            }
        }

        let (secret, origin) = match self.locate_credential(refresh_blob, session.as_ref()) {
            Ok(located) => located,
            Err(kind) => return Err(self.fail(session_id.as_deref(), kind)),
        };

        let pair = match self.identity.refresh_session(&secret).await {
            Ok(pair) => pair,
            Err(e) => {
                let kind = if e.is_rejection() {
                    AuthErrorKind::RefreshRejected
                } else {
                    AuthErrorKind::RefreshTransportFailure
                };
                tracing::warn!(error = %e, reason = %kind, "Session refresh failed");
                return Err(self.fail(session_id.as_deref(), kind));
            }
        };

        self.install(session_id.as_deref(), pair, origin).await
    }

    fn locate_credential(
        &self,
        refresh_blob: Option<&str>,
        session: Option<&Session>,
    ) -> Result<(String, CredentialOrigin), AuthErrorKind> {
        // Cookie takes precedence over the session-stored copy
        if let Some(blob) = refresh_blob {
            return match self.vault.decrypt(blob) {
                Ok(secret) => Ok((secret, CredentialOrigin::Cookie)),
                Err(e) => {
                    tracing::debug!(error = %e, "Refresh cookie failed decryption");
                    Err(AuthErrorKind::RefreshCredentialCorrupt)
                }
            };
        }

        if let Some(secret) = session.and_then(|s| s.refresh_token.clone()) {
            return Ok((secret, CredentialOrigin::Session));
        }

        Err(match session {
            Some(_) => AuthErrorKind::RefreshCredentialAbsent,
            None => AuthErrorKind::TokenAbsent,
        })
    }

    /// Apply a refreshed credential pair: swap the fully built session in,
    /// retire the old identifier, verify the new token upstream and rewrite
    /// cookies. A refresh that does not yield a usable principal is treated
    /// as a total failure.
    async fn install(
        &self,
        old_id: Option<&str>,
        pair: TokenPair,
        origin: CredentialOrigin,
    ) -> Result<AuthOutcome, AuthErrorKind> {
        let in_cookie = origin == CredentialOrigin::Cookie;

        let user_id = match pair.user.as_ref() {
            Some(user) => user.id.clone(),
            None => match self.inspector.decode(&pair.access_token) {
                Ok(claims) => claims.sub,
                Err(e) => {
                    tracing::error!(error = %e, "Refreshed access token does not decode");
                    return Err(self.fail(old_id, AuthErrorKind::PostRefreshVerificationFailure));
                }
            },
        };

        let refreshed = Session {
            access_token: pair.access_token.clone(),
            user_id,
            refresh_token: (!in_cookie).then(|| pair.refresh_token.clone()),
        };

        let new_id = match old_id {
            Some(old) => {
                self.sessions.store(old, refreshed);
                match self.sessions.regenerate(old) {
                    Some(id) => id,
                    None => {
                        return Err(self.fail(Some(old), AuthErrorKind::PostRefreshVerificationFailure));
                    }
                }
            }
            None => self.sessions.create(refreshed),
        };

        let principal = match self.identity.verify_access_token(&pair.access_token).await {
            Some(principal) => principal,
            None => {
                tracing::warn!("Refreshed access token failed verification");
                return Err(self.fail(Some(&new_id), AuthErrorKind::PostRefreshVerificationFailure));
            }
        };

        let mut cookies = vec![self.session_cookie(&new_id, in_cookie)];
        if in_cookie {
            match self.vault.encrypt(&pair.refresh_token) {
                Ok(blob) => cookies.push(self.refresh_cookie(&blob)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to seal rotated refresh credential");
                    return Err(self.fail(Some(&new_id), AuthErrorKind::PostRefreshVerificationFailure));
                }
            }
        }

        Ok(AuthOutcome {
            principal,
            session_id: new_id,
            cookies,
        })
    }

    async fn adopt_regenerated(&self, old_id: &str) -> Option<AuthOutcome> {
        let new_id = self.sessions.follow_alias(old_id)?;
        let session = self.sessions.load(&new_id)?;
        let principal = self.identity.verify_access_token(&session.access_token).await?;

        // refresh_token absent means the credential lives in the cookie,
        // which marks a remember-me session
        let persistent = session.refresh_token.is_none();
        Some(AuthOutcome {
            cookies: vec![self.session_cookie(&new_id, persistent)],
            principal,
            session_id: new_id,
        })
    }

    /// Destroy the session (if any) and pass the error kind through.
    fn fail(&self, session_id: Option<&str>, kind: AuthErrorKind) -> AuthErrorKind {
        if let Some(id) = session_id {
            self.sessions.destroy(id);
        }
        kind
    }

    fn refresh_guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut guards = self.refresh_guards.lock().unwrap_or_else(|e| e.into_inner());
        if guards.len() > MAX_GUARDS {
            guards.retain(|_, guard| Arc::strong_count(guard) > 1);
        }
        guards
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn session_cookie(&self, id: &str, persistent: bool) -> String {
        let max_age =
            (persistent && self.settings.session_lifetime_secs > 0).then_some(self.settings.session_lifetime_secs);
        build_cookie(SESSION_COOKIE_NAME, id, max_age, self.settings.secure_cookies)
    }

    fn refresh_cookie(&self, blob: &str) -> String {
        build_cookie(
            REFRESH_COOKIE_NAME,
            blob,
            Some(self.settings.refresh_cookie_max_age_secs),
            self.settings.secure_cookies,
        )
    }
}

fn anon_guard_key(blob: &str) -> String {
    use base64::Engine;
    let digest = openssl::sha::sha256(blob.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

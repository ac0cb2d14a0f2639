//! Server-side session state.
//!
//! A session is keyed by a random identifier carried in the `session_id`
//! cookie and holds the upstream credential pair for one signed-in client.
//! The store is an injected interface so the host can swap the in-process
//! map for shared storage without touching the orchestrator.

use std::collections::HashMap;
use std::sync::RwLock;

/// Per-client authenticated state.
///
/// `access_token` is always non-empty; a client without a usable access
/// token has no session at all. `refresh_token` is populated only when the
/// refresh credential is kept server-side instead of in the encrypted
/// cookie.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    pub refresh_token: Option<String>,
}

/// Storage for sessions, keyed by session identifier.
pub trait SessionStore: Send + Sync {
    /// Insert a session under a freshly generated identifier.
    fn create(&self, session: Session) -> String;

    fn load(&self, id: &str) -> Option<Session>;

    /// Overwrite the session stored under `id`.
    fn store(&self, id: &str, session: Session);

    fn destroy(&self, id: &str);

    /// Move the session to a new identifier, invalidating the old one.
    /// Records an alias from the old identifier so a request that raced the
    /// regeneration can still find the session. Returns the new identifier,
    /// or None if no session was stored under `old_id`.
    fn regenerate(&self, old_id: &str) -> Option<String>;

    /// Resolve an identifier that was invalidated by [`regenerate`](Self::regenerate).
    fn follow_alias(&self, old_id: &str) -> Option<String>;
}

const MAX_ALIASES: usize = 1024;

/// In-process session store backing the default deployment.
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    aliases: HashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, session: Session) -> String {
        let id = Self::new_id();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sessions.insert(id.clone(), session);
        id
    }

    fn load(&self, id: &str) -> Option<Session> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.sessions.get(id).cloned()
    }

    fn store(&self, id: &str, session: Session) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sessions.insert(id.to_string(), session);
    }

    fn destroy(&self, id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sessions.remove(id);
    }

    fn regenerate(&self, old_id: &str) -> Option<String> {
        let new_id = Self::new_id();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let session = inner.sessions.remove(old_id)?;
        inner.sessions.insert(new_id.clone(), session);
        if inner.aliases.len() >= MAX_ALIASES {
            // best-effort map; dropping stale aliases only costs a re-login
            inner.aliases.clear();
        }
        inner.aliases.insert(old_id.to_string(), new_id.clone());
        Some(new_id)
    }

    fn follow_alias(&self, old_id: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.aliases.get(old_id).cloned()
    }
}

//! Session and token-lifecycle middleware.
//!
//! Relying-party authentication against an upstream identity API: access
//! tokens are checked locally for expiry, confirmed upstream, and renewed
//! transparently with a refresh credential kept either in an encrypted
//! cookie or in the server-side session. Session identifiers are
//! regenerated after every refresh. Failed requests are answered with a
//! JSON 401 for machine clients and a login redirect for browsers.

pub mod handlers;

mod claims;
mod client;
mod cookie;
mod gate;
mod layer;
mod respond;
mod session;
mod vault;

pub use claims::{AccessClaims, ClaimError, TokenInspector};
pub use client::{IdentityClient, IdentityError, Principal, TokenPair};
pub use cookie::{REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME, get_cookie};
pub use gate::{AuthGate, AuthOutcome, GateSettings};
pub use layer::{AuthState, CurrentUser, require_auth};
pub use respond::{AuthErrorKind, ClientKind, UnauthorizedResponse};
pub use session::{MemorySessionStore, Session, SessionStore};
pub use vault::{VAULT_KEY_LEN, Vault, VaultError};

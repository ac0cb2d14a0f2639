//! Local access-token inspection.
//!
//! Decodes the claims of an upstream-issued access token with the shared
//! verification key and answers expiry questions without a network call.
//! This is a fast path only: a token that passes here must still be
//! confirmed with the identity provider, because local checks cannot see
//! server-side revocation.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Claims carried by an upstream access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id at the identity provider)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Email address, when the provider includes it
    #[serde(default)]
    pub email: Option<String>,
    /// Provider-assigned role
    #[serde(default)]
    pub role: Option<String>,
}

/// Decodes access-token claims with the shared verification key.
#[derive(Clone)]
pub struct TokenInspector {
    decoding_key: DecodingKey,
}

/// Errors that can occur while inspecting a token.
#[derive(Debug)]
pub enum ClaimError {
    /// Error decoding the token (malformed, bad signature, wrong algorithm)
    Decoding(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for ClaimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
        }
    }
}

impl std::error::Error for ClaimError {}

impl TokenInspector {
    /// Create an inspector for tokens signed with the given shared secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Decode and signature-check a token without enforcing expiry.
    /// Expiry is evaluated separately so callers can distinguish a stale
    /// token (refreshable) from a forged one.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, ClaimError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(ClaimError::Decoding)?;

        Ok(token_data.claims)
    }

    /// Whether the token should be treated as expired.
    /// Any decode failure counts as expired: fail closed, never open.
    pub fn is_expired(&self, token: &str) -> bool {
        let claims = match self.decode(token) {
            Ok(claims) => claims,
            Err(_) => return true,
        };

        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => now.as_secs() >= claims.exp,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &[u8] = b"test-verification-key-for-claims";

    fn make_token(secret: &[u8], exp_offset: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = AccessClaims {
            sub: "user-1".to_string(),
            exp: (now + exp_offset) as u64,
            email: Some("alice@example.com".to_string()),
            role: Some("authenticated".to_string()),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_valid_token_not_expired() {
        let inspector = TokenInspector::new(SECRET);
        let token = make_token(SECRET, 300);

        assert!(!inspector.is_expired(&token));

        let claims = inspector.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let inspector = TokenInspector::new(SECRET);
        let token = make_token(SECRET, -1);

        assert!(inspector.is_expired(&token));
    }

    #[test]
    fn test_expired_token_still_decodes() {
        // Stale tokens must stay readable so the refresh path can run.
        let inspector = TokenInspector::new(SECRET);
        let token = make_token(SECRET, -100);

        let claims = inspector.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_malformed_token_is_expired() {
        let inspector = TokenInspector::new(SECRET);

        assert!(inspector.is_expired("not-a-token"));
        assert!(inspector.is_expired(""));
        assert!(inspector.is_expired("a.b.c"));
    }

    #[test]
    fn test_wrong_secret_is_expired() {
        let inspector = TokenInspector::new(SECRET);
        let token = make_token(b"some-other-verification-key", 300);

        assert!(inspector.is_expired(&token));
        assert!(inspector.decode(&token).is_err());
    }
}

//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::VAULT_KEY_LEN;
use clap::Parser;
use tracing::error;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Platter",
    about = "Admin backend for delivery and catering operations"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7391")]
    pub port: u16,

    /// Public origin of this server (used to derive the Secure cookie flag)
    #[arg(long, default_value = "http://localhost:7391")]
    pub public_url: String,

    /// Base URL of the identity provider
    #[arg(long, env = "IDENTITY_URL")]
    pub identity_url: String,

    /// API key sent with every identity provider call
    #[arg(long, env = "IDENTITY_API_KEY")]
    pub identity_api_key: Option<String>,

    /// Path unauthenticated browsers are redirected to
    #[arg(long, default_value = "/login")]
    pub login_path: String,

    /// Remember-me session cookie lifetime in seconds; 0 for browser-session-only
    #[arg(long, env = "SESSION_LIFETIME_SECS", default_value = "604800")]
    pub session_lifetime_secs: u64,

    /// Refresh credential cookie lifetime in days
    #[arg(long, env = "REFRESH_COOKIE_DAYS", default_value = "60")]
    pub refresh_cookie_days: u64,

    /// Deadline in seconds for identity provider calls
    #[arg(long, default_value = "10")]
    pub http_timeout_secs: u64,

    /// Path to file containing the JWT verification secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the base64url vault key. Prefer using VAULT_KEY env var instead
    #[arg(long)]
    pub vault_key_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the JWT verification secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = match load_secret("JWT_SECRET", jwt_secret_file) {
        Some(secret) => secret,
        None => {
            error!(
                "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
            );
            return None;
        }
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the vault key from environment variable or file.
/// The key must be base64url without padding and decode to exactly 32 bytes.
pub fn load_vault_key(vault_key_file: Option<&str>) -> Option<[u8; VAULT_KEY_LEN]> {
    use base64::Engine;

    let encoded = match load_secret("VAULT_KEY", vault_key_file) {
        Some(encoded) => encoded,
        None => {
            error!(
                "Vault key is required. Set VAULT_KEY environment variable (recommended) or use --vault-key-file"
            );
            return None;
        }
    };

    let decoded = match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&encoded) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(error = %e, "Vault key is not valid base64url");
            return None;
        }
    };

    match <[u8; VAULT_KEY_LEN]>::try_from(decoded.as_slice()) {
        Ok(key) => Some(key),
        Err(_) => {
            error!(
                "Vault key must decode to exactly {} bytes, got {}",
                VAULT_KEY_LEN,
                decoded.len()
            );
            None
        }
    }
}

fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        return Some(secret);
    }
    let path = file?;
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content.trim().to_string()),
        Err(e) => {
            error!(path = %path, error = %e, "Failed to read secret file");
            None
        }
    }
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("Public URL must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Parse and validate the identity provider base URL.
pub fn validate_identity_url(identity_url: &str) -> Option<Url> {
    let url = match Url::parse(identity_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %identity_url, error = %e, "Invalid identity provider URL");
            return None;
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        error!(url = %identity_url, "Identity provider URL must be http(s)");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    public_url: &Url,
    identity_url: Url,
    jwt_secret: String,
    vault_key: [u8; VAULT_KEY_LEN],
) -> ServerConfig {
    let secure_cookies = public_url.scheme() == "https";

    ServerConfig {
        identity_url,
        identity_api_key: args.identity_api_key.clone(),
        jwt_secret: jwt_secret.into_bytes(),
        vault_key,
        login_path: args.login_path.clone(),
        secure_cookies,
        session_lifetime_secs: args.session_lifetime_secs,
        refresh_cookie_max_age_secs: args.refresh_cookie_days * 24 * 60 * 60,
        http_timeout_secs: args.http_timeout_secs,
    }
}

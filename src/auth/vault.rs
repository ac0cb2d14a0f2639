//! Symmetric vault for the refresh credential.
//!
//! Encrypts the refresh secret before it is handed to the client as a
//! cookie. AES-256-GCM with a fresh random IV per call; the encoded blob
//! packs `iv ‖ tag ‖ ciphertext` into one base64url string so it fits a
//! single cookie value. Tampering surfaces as a decrypt error, which
//! callers treat the same as a missing credential.

use openssl::symm::{Cipher, decrypt_aead, encrypt_aead};
use rand::RngCore;

/// Required key length in bytes.
pub const VAULT_KEY_LEN: usize = 32;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors that can occur in the vault.
#[derive(Debug)]
pub enum VaultError {
    /// Blob is not valid base64 or is too short to contain IV and tag
    Malformed,
    /// Cipher operation failed (tampered ciphertext, wrong key)
    Crypto,
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultError::Malformed => write!(f, "Credential blob is malformed"),
            VaultError::Crypto => write!(f, "Credential blob failed decryption"),
        }
    }
}

impl std::error::Error for VaultError {}

/// Encrypts and decrypts refresh credentials with a fixed symmetric key.
#[derive(Clone)]
pub struct Vault {
    key: [u8; VAULT_KEY_LEN],
}

impl Vault {
    pub fn new(key: [u8; VAULT_KEY_LEN]) -> Self {
        Self { key }
    }

    /// Encrypt a refresh secret into an opaque cookie-safe blob.
    pub fn encrypt(&self, secret: &str) -> Result<String, VaultError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let mut tag = [0u8; TAG_LEN];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key,
            Some(&iv),
            &[],
            secret.as_bytes(),
            &mut tag,
        )
        .map_err(|_| VaultError::Crypto)?;

        let mut packed = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
        packed.extend_from_slice(&iv);
        packed.extend_from_slice(&tag);
        packed.extend_from_slice(&ciphertext);

        Ok(base64_encode(&packed))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let packed = base64_decode(blob).ok_or(VaultError::Malformed)?;
        if packed.len() < IV_LEN + TAG_LEN {
            return Err(VaultError::Malformed);
        }

        let (iv, rest) = packed.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let plaintext = decrypt_aead(Cipher::aes_256_gcm(), &self.key, Some(iv), &[], ciphertext, tag)
            .map_err(|_| VaultError::Crypto)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::Malformed)
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn base64_decode(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data).ok()
}

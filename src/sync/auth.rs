//! MQTT credential derivation with AES-256-CBC + HMAC-SHA256.
//!
//! The broker authenticates each device with a short-lived password:
//!
//! 1. `enc_key = AES-256-CBC(secret.key, secret.iv, client_id)`. The
//!    client id is exactly one block, so this is a single block
//!    encryption of `client_id ^ iv`.
//! 2. `window = floor(unix_time / 60) * 60`
//! 3. `tag = HMAC-SHA256(enc_key, client_id || "-" || window)`
//! 4. `password = base64(tag)`
//!
//! The password is stable for a 60 second window, so the worker derives a
//! fresh one on every connect attempt instead of caching it.

use aes::Aes256;
use aes::cipher::{BlockEncrypt, KeyInit};
use core::fmt;
use log::warn;

use super::codec;
use crate::config::CredentialSecret;

/// Client identifiers are exactly one AES block.
pub const CLIENT_ID_LEN: usize = 16;

/// Width of the password rotation window in seconds.
pub const WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// Client id is not exactly [`CLIENT_ID_LEN`] bytes.
    InvalidClientId,
    /// The block cipher rejected the key material.
    Cipher,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidClientId => write!(f, "client id must be {CLIENT_ID_LEN} bytes"),
            Self::Cipher => write!(f, "cipher initialisation failed"),
        }
    }
}

/// Start of the 60 second window containing `unix_time`.
pub const fn window_start(unix_time: u64) -> u64 {
    unix_time - unix_time % WINDOW_SECS
}

/// Encrypt the client id under the shared secret (step 1).
pub fn encrypt_client_id(
    client_id: &str,
    secret: &CredentialSecret,
) -> Result<[u8; CLIENT_ID_LEN], CredentialError> {
    let id: &[u8; CLIENT_ID_LEN] = client_id
        .as_bytes()
        .try_into()
        .map_err(|_| CredentialError::InvalidClientId)?;

    let cipher = Aes256::new_from_slice(&secret.key).map_err(|_| CredentialError::Cipher)?;

    let mut block = [0u8; CLIENT_ID_LEN];
    for (out, (p, v)) in block.iter_mut().zip(id.iter().zip(secret.iv.iter())) {
        *out = p ^ v;
    }
    cipher.encrypt_block((&mut block).into());
    Ok(block)
}

/// Derive the broker password for `client_id` at `unix_time`.
pub fn derive_password(
    client_id: &str,
    unix_time: u64,
    secret: &CredentialSecret,
) -> Result<String, CredentialError> {
    let enc_key = encrypt_client_id(client_id, secret).inspect_err(|e| {
        warn!("auth: credential derivation failed: {e}");
    })?;

    let window = window_start(unix_time).to_string();
    let tag = codec::hmac_sha256(&enc_key, &[client_id.as_bytes(), b"-", window.as_bytes()]);
    Ok(codec::encode(&tag))
}

// ── Tests ────────────────────────────────────────────────────

//! Payload codecs shared by the credential deriver and file transfers.
//!
//! - Standard base64 (`+`/`/`, `=`-padded), optionally wrapped at
//!   [`WRAP_COLUMNS`] characters per line for human-facing output.
//!   Wire payloads always use the unwrapped form.
//! - A tolerant decoder that skips every byte outside the alphabet
//!   (newlines, spaces, stray control bytes) and rejects more than two
//!   trailing `=`.
//! - URL-safe base64 (`-`/`_`, no padding) for callers that embed
//!   payloads in URLs.
//! - HMAC-SHA256 over any number of input segments, so signing strings
//!   never need to be concatenated first.

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

/// Line width of [`encode_wrapped`].
pub const WRAP_COLUMNS: usize = 72;

/// Standard alphabet, padding optional on input.
const TOLERANT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// More than two trailing `=`.
    Padding,
    /// Invalid symbol placement or trailing bits.
    Malformed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Padding => write!(f, "malformed base64 padding"),
            Self::Malformed => write!(f, "malformed base64 input"),
        }
    }
}

// ── Base64 ────────────────────────────────────────────────────

/// Encode with the standard alphabet, padded, no line breaks.
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encode with the standard alphabet, breaking lines every
/// [`WRAP_COLUMNS`] characters. No trailing newline.
pub fn encode_wrapped(data: &[u8]) -> String {
    let flat = STANDARD.encode(data);
    let mut out = String::with_capacity(flat.len() + flat.len() / WRAP_COLUMNS);
    for (i, line) in flat.as_bytes().chunks(WRAP_COLUMNS).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // base64 output is pure ASCII, so every chunk is valid UTF-8.
        out.push_str(core::str::from_utf8(line).unwrap_or_default());
    }
    out
}

/// Decode standard base64, skipping any byte that is neither in the
/// alphabet nor `=`.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let filtered: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| is_standard_symbol(*b) || *b == b'=')
        .collect();

    let padding = filtered.iter().rev().take_while(|b| **b == b'=').count();
    if padding > 2 {
        return Err(CodecError::Padding);
    }

    TOLERANT.decode(&filtered).map_err(|_| CodecError::Malformed)
}

/// Upper bound on the decoded size of `encoded_len` base64 characters.
pub const fn decoded_len_bound(encoded_len: usize) -> usize {
    encoded_len.div_ceil(4) * 3
}

/// Longest input the tolerant decoder can accept for `decoded_len`
/// bytes: padded output plus a CRLF every [`WRAP_COLUMNS`] characters.
pub const fn max_encoded_len(decoded_len: usize) -> usize {
    let flat = decoded_len.div_ceil(3) * 4;
    flat + (flat / WRAP_COLUMNS) * 2
}

/// Encode with the URL-safe alphabet, unpadded.
pub fn encode_url_safe(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode URL-safe, unpadded base64.
pub fn decode_url_safe(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    URL_SAFE_NO_PAD.decode(input).map_err(|_| CodecError::Malformed)
}

fn is_standard_symbol(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

// ── HMAC-SHA256 ───────────────────────────────────────────────

/// HMAC-SHA256 of the concatenation of `parts` under `key`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = hmac_sha256::HMAC::new(key);
    for part in parts {
        mac.update(*part);
    }
    mac.finalize()
}

// ── Tests ────────────────────────────────────────────────────

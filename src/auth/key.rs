//! Partial key derivation.
//!
//! The server names a byte range of the shared secret; the client answers
//! with that range, base64-encoded. Bit-exactness matters: a wrong slice or
//! alphabet gets an opaque rejection from auth2, not an error message.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// The requested key range does not fit the secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyRangeError {
    #[error("key range {offset}+{length} exceeds the {secret_len}-byte secret")]
    OutOfBounds {
        offset: usize,
        length: usize,
        secret_len: usize,
    },

    #[error("negative key {field}: {value}")]
    Negative { field: &'static str, value: i64 },
}

/// Base64 of `secret[offset..offset + length]`.
pub fn derive_partial_key(
    secret: &[u8],
    offset: usize,
    length: usize,
) -> Result<String, KeyRangeError> {
    let end = offset
        .checked_add(length)
        .filter(|&end| end <= secret.len())
        .ok_or(KeyRangeError::OutOfBounds {
            offset,
            length,
            secret_len: secret.len(),
        })?;

    Ok(STANDARD.encode(&secret[offset..end]))
}

//! Opaque capability tokens.
//!
//! Raw tokens go to the client once; only [`hash_token`] output is stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Smallest token the codec will ever draw.
pub const MIN_TOKEN_BYTES: usize = 16;

/// Draws `bytes` random bytes from the OS and encodes them URL-safe.
///
/// Requests below [`MIN_TOKEN_BYTES`] are raised to it.
pub fn new_token(bytes: usize) -> Result<String> {
    let mut buffer = vec![0u8; bytes.max(MIN_TOKEN_BYTES)];
    OsRng.try_fill_bytes(&mut buffer)?;
    Ok(URL_SAFE_NO_PAD.encode(buffer))
}

/// SHA-256 of the raw token, URL-safe encoded. Unsalted so it can be an index key.
pub fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

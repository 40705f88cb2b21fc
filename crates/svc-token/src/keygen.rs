//! Shared secret generation for HMAC algorithms

use rand::RngCore;

pub use crate::error::KeygenError;

/// Default shared secret size in bits
pub const DEFAULT_SECRET_BITS: usize = 512;

/// Generate a random hex-encoded shared secret of `bits` bits
///
/// `bits` is rounded up to whole bytes, so the result holds `2 * ceil(bits / 8)`
/// hex characters.
///
/// # Errors
///
/// Returns [`KeygenError::ZeroBits`] when `bits` is zero.
///
/// ```rust
/// use svc_token::keygen::{generate_shared_secret, DEFAULT_SECRET_BITS};
///
/// let secret = generate_shared_secret(DEFAULT_SECRET_BITS)?;
/// assert_eq!(secret.len(), 128);
/// # Ok::<(), svc_token::keygen::KeygenError>(())
/// ```
pub fn generate_shared_secret(bits: usize) -> Result<String, KeygenError> {
    if bits == 0 {
        return Err(KeygenError::ZeroBits);
    }

    let mut bytes = vec![0u8; bits.div_ceil(8)];
    rand::rng().fill_bytes(&mut bytes);
    Ok(hex::encode(bytes))
}

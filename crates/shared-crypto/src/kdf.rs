//! # HKDF-SHA256
//!
//! Extract-and-expand key derivation (RFC 5869). Used to stretch one
//! long-term root secret into independent, context-bound subkeys.

use crate::CryptoError;
use hkdf::Hkdf;
use sha2::Sha256;

/// Derive `N` bytes from `ikm` with the given `salt` and `info`.
///
/// # Errors
///
/// Returns `CryptoError::InvalidInput` if `N` exceeds 255 * 32 bytes.
pub fn hkdf_sha256<const N: usize>(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<[u8; N], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; N];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::InvalidInput(format!("hkdf expand failed: {e}")))?;
    Ok(okm)
}

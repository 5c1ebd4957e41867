//! RSA public key reconstruction from JWK components.
//!
//! A JWKS entry carries the modulus (`n`) and public exponent (`e`) as
//! base64url big-endian integers. Both are decoded and sanity-checked here
//! before a [`DecodingKey`] is built, so a malformed entry is rejected at
//! refresh time rather than surfacing as a confusing verification failure.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while decoding JWK key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("RSA modulus is not valid base64url: {0}")]
    InvalidModulus(String),

    #[error("RSA exponent is not valid base64url: {0}")]
    InvalidExponent(String),

    #[error("RSA modulus is empty")]
    EmptyModulus,

    #[error("RSA exponent is zero")]
    ZeroExponent,
}

/// An RSA public key ready for RS256 signature verification.
#[derive(Clone)]
pub struct RsaPublicKey {
    decoding_key: DecodingKey,
    modulus_bits: usize,
}

impl RsaPublicKey {
    /// The key in the form `jsonwebtoken` verifies against.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Size of the modulus in bits, ignoring leading zero bytes.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}

/// Decode a base64url modulus/exponent pair into an RSA public key.
///
/// Trailing `=` padding is tolerated even though JWKs should omit it.
///
/// # Errors
///
/// Returns `KeyDecodeError` if either component is not valid base64url, the
/// modulus is empty, or the exponent is zero.
pub fn decode_rsa_components(n: &str, e: &str) -> Result<RsaPublicKey, KeyDecodeError> {
    let modulus = URL_SAFE_NO_PAD
        .decode(n.trim_end_matches('='))
        .map_err(|err| KeyDecodeError::InvalidModulus(err.to_string()))?;
    let exponent = URL_SAFE_NO_PAD
        .decode(e.trim_end_matches('='))
        .map_err(|err| KeyDecodeError::InvalidExponent(err.to_string()))?;

    let modulus = strip_leading_zeros(&modulus);
    if modulus.is_empty() {
        return Err(KeyDecodeError::EmptyModulus);
    }
    let exponent = strip_leading_zeros(&exponent);
    if exponent.is_empty() {
        return Err(KeyDecodeError::ZeroExponent);
    }

    let modulus_bits = modulus.len() * 8
        - modulus
            .first()
            .map_or(0, |b| b.leading_zeros() as usize);

    tracing::trace!(target: "auth.keys", modulus_bits, "Decoded RSA public key");

    Ok(RsaPublicKey {
        decoding_key: DecodingKey::from_rsa_raw_components(modulus, exponent),
        modulus_bits,
    })
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(start..).unwrap_or_default()
}

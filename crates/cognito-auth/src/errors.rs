//! Externally visible authentication errors.
//!
//! Every internal failure (malformed header, unknown key, JWKS outage, bad
//! signature, policy violation) is collapsed into one of the two variants
//! below before it leaves the authenticator. The display strings are generic
//! so a caller probing with forged tokens learns nothing about which check
//! failed. Details are logged server-side at debug level.

use thiserror::Error;

/// Classified authentication failure.
///
/// The routing layer maps these to HTTP statuses:
/// - `Unauthenticated`: 401 Unauthorized
/// - `Forbidden`: 403 Forbidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No valid credential was presented: absent, malformed, wrongly signed,
    /// expired, issued by someone else, or signed with an unknown key.
    #[error("The access token is invalid or expired")]
    Unauthenticated,

    /// The credential is cryptographically valid but violates policy (wrong
    /// token-use class or client not allow-listed).
    #[error("The access token is not permitted for this service")]
    Forbidden,
}

impl AuthError {
    /// Stable label for metrics and structured logs.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden => "forbidden",
        }
    }
}

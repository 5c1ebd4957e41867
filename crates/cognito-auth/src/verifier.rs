//! Cryptographic and policy checks for Cognito tokens.
//!
//! Checks run in two phases and the second never starts unless the first
//! succeeded:
//!
//! 1. [`ClaimsVerifier::verify`] - RS256 signature against the resolved key,
//!    exact issuer match, `exp` present and not in the past (no leeway).
//! 2. [`ClaimsVerifier::check_policy`] - `token_use` class and client
//!    allow-list.
//!
//! A forged token therefore never reaches a policy branch.

use crate::claims::VerifiedClaims;
use crate::config::AuthConfig;
use crate::keys::RsaPublicKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::collections::HashSet;
use thiserror::Error;

/// Phase 1 failures (map to `AuthError::Unauthenticated`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("signature verification failed")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("issuer mismatch")]
    InvalidIssuer,

    #[error("required claim missing: {0}")]
    MissingClaim(String),

    #[error("token is malformed: {0}")]
    Malformed(String),
}

/// Phase 2 failures (map to `AuthError::Forbidden`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("token_use '{actual}' does not match expected '{expected}'")]
    TokenUseMismatch { expected: String, actual: String },

    #[error("client is not allow-listed")]
    ClientNotAllowed,
}

/// Verifies signature, issuer, expiry and policy claims.
#[derive(Debug, Clone)]
pub struct ClaimsVerifier {
    issuer: String,
    allowed_clients: HashSet<String>,
    token_use: String,
    validation: Validation,
}

impl ClaimsVerifier {
    /// Build a verifier from a validated config.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let issuer = config.issuer();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        // Cognito access tokens carry no `aud`; the client check is done in
        // `check_policy` against `client_id`/`aud` instead.
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            issuer,
            allowed_clients: config.app_client_ids.iter().cloned().collect(),
            token_use: config.token_use.clone(),
            validation,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify the token signature and registered claims.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` for a bad signature, an expired or missing `exp`,
    /// an issuer mismatch, or a payload that does not deserialize.
    pub fn verify(&self, token: &str, key: &RsaPublicKey) -> Result<VerifiedClaims, VerifyError> {
        let data = decode::<VerifiedClaims>(token, key.decoding_key(), &self.validation)
            .map_err(|e| {
                tracing::debug!(target: "auth.verifier", error = %e, "Token verification failed");
                match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidRsaKey(_) => {
                        VerifyError::InvalidSignature
                    }
                    ErrorKind::ExpiredSignature => VerifyError::Expired,
                    ErrorKind::InvalidIssuer => VerifyError::InvalidIssuer,
                    ErrorKind::MissingRequiredClaim(claim) => {
                        VerifyError::MissingClaim(claim.clone())
                    }
                    other => VerifyError::Malformed(format!("{other:?}")),
                }
            })?;

        Ok(data.claims)
    }

    /// Check the token class and client of already verified claims, returning
    /// the accepted client id.
    ///
    /// With no `client_id`, any allow-listed `aud` entry is accepted.
    ///
    /// # Errors
    ///
    /// - `TokenUseMismatch` if `token_use` is present and differs
    ///   (case-insensitively) from the expected class
    /// - `ClientNotAllowed` if no candidate client id is allow-listed
    pub fn check_policy(&self, claims: &VerifiedClaims) -> Result<String, PolicyViolation> {
        if let Some(token_use) = claims.token_use.as_deref().filter(|t| !t.is_empty()) {
            if !token_use.eq_ignore_ascii_case(&self.token_use) {
                tracing::debug!(
                    target: "auth.verifier",
                    expected = %self.token_use,
                    actual = %token_use,
                    "Token rejected: token_use mismatch"
                );
                return Err(PolicyViolation::TokenUseMismatch {
                    expected: self.token_use.clone(),
                    actual: token_use.to_string(),
                });
            }
        }

        if let Some(client) = claims
            .client_candidates()
            .find(|c| self.allowed_clients.contains(*c))
        {
            return Ok(client.to_string());
        }

        tracing::debug!(
            target: "auth.verifier",
            client_id = ?claims.client(),
            "Token rejected: client not allow-listed"
        );
        Err(PolicyViolation::ClientNotAllowed)
    }
}

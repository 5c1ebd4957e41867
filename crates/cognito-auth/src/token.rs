//! Unverified JWT header parsing.
//!
//! The header is read before any signature check solely to pick the signing
//! key (`kid`) and to refuse algorithms other than RS256 up front. Nothing
//! read here is trusted beyond that.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; `none`, HMAC and other algorithms are refused
//!   before any key is looked up
//! - Error messages are generic; details go to debug logs

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

/// Maximum accepted token size in bytes (16 KiB).
///
/// Cognito access tokens are typically 1-2 KB; ID tokens for users in many
/// groups grow larger. Anything past this limit is rejected before base64
/// decoding or signature verification.
pub const MAX_TOKEN_SIZE_BYTES: usize = 16 * 1024;

/// The only signing algorithm this crate trusts.
pub const SUPPORTED_ALGORITHM: &str = "RS256";

/// Header parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("The access token is invalid or expired")]
    Empty,

    #[error("The access token is invalid or expired")]
    TooLarge,

    #[error("The access token is invalid or expired")]
    Malformed,

    #[error("The access token is invalid or expired")]
    MissingKid,

    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm(String),
}

/// `kid` and `alg` read from a token header without verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    pub kid: String,
    pub alg: String,
}

/// Parse the header of a compact JWS without verifying its signature.
///
/// # Errors
///
/// - `Empty` - token is empty after trimming
/// - `TooLarge` - token exceeds `MAX_TOKEN_SIZE_BYTES`
/// - `Malformed` - not three dot-separated parts, bad base64url, or bad JSON
/// - `MissingKid` - `kid` absent, empty, or not a string
/// - `UnsupportedAlgorithm` - `alg` is anything but RS256
pub fn parse_unverified_header(token: &str) -> Result<UnverifiedHeader, TokenError> {
    if token.trim().is_empty() {
        return Err(TokenError::Empty);
    }

    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "auth.token",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(TokenError::TooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "auth.token", "Token rejected: invalid JWT format");
        return Err(TokenError::Malformed);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "auth.token", error = %e, "Failed to decode JWT header base64");
        TokenError::Malformed
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "auth.token", error = %e, "Failed to parse JWT header JSON");
        TokenError::Malformed
    })?;

    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(TokenError::MissingKid)?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if alg != SUPPORTED_ALGORITHM {
        tracing::debug!(target: "auth.token", alg = %alg, "Token rejected: unsupported algorithm");
        return Err(TokenError::UnsupportedAlgorithm(alg));
    }

    Ok(UnverifiedHeader { kid, alg })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    #[test]
    fn test_parse_valid_header() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"test-key-01"}"#);
        let header = parse_unverified_header(&token).unwrap();
        assert_eq!(header.kid, "test-key-01");
        assert_eq!(header.alg, "RS256");
    }

    #[test]
    fn test_empty_and_blank_tokens() {
        assert_eq!(parse_unverified_header(""), Err(TokenError::Empty));
        assert_eq!(parse_unverified_header("  \t\n"), Err(TokenError::Empty));
    }

    #[test]
    fn test_wrong_part_count() {
        assert_eq!(parse_unverified_header("single"), Err(TokenError::Malformed));
        assert_eq!(parse_unverified_header("only.two"), Err(TokenError::Malformed));
        assert_eq!(
            parse_unverified_header("not.a.valid.jwt"),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_invalid_base64_and_json() {
        assert_eq!(
            parse_unverified_header("!!!invalid!!!.payload.signature"),
            Err(TokenError::Malformed)
        );
        let token = format!("{}.payload.signature", URL_SAFE_NO_PAD.encode("not json"));
        assert_eq!(parse_unverified_header(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_missing_or_invalid_kid() {
        for header in [
            r#"{"alg":"RS256","typ":"JWT"}"#,
            r#"{"alg":"RS256","kid":""}"#,
            r#"{"alg":"RS256","kid":12345}"#,
            r#"{"alg":"RS256","kid":null}"#,
        ] {
            assert_eq!(
                parse_unverified_header(&token_with_header(header)),
                Err(TokenError::MissingKid),
                "header {header}"
            );
        }
    }

    #[test]
    fn test_rejects_algorithm_confusion() {
        for alg in ["HS256", "none", "RS512", "ES256", "EdDSA", "rs256"] {
            let header = format!(r#"{{"alg":"{alg}","kid":"k"}}"#);
            assert_eq!(
                parse_unverified_header(&token_with_header(&header)),
                Err(TokenError::UnsupportedAlgorithm(alg.to_string()))
            );
        }

        let token = token_with_header(r#"{"kid":"k"}"#);
        assert_eq!(
            parse_unverified_header(&token),
            Err(TokenError::UnsupportedAlgorithm(String::new()))
        );
    }

    #[test]
    fn test_oversized_token() {
        let oversized = "a".repeat(MAX_TOKEN_SIZE_BYTES + 1);
        assert_eq!(parse_unverified_header(&oversized), Err(TokenError::TooLarge));
    }

    #[test]
    fn test_token_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key"}"#);
        let remaining = MAX_TOKEN_SIZE_BYTES - header_b64.len() - 2;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(remaining / 2),
            "b".repeat(remaining - remaining / 2)
        );
        assert_eq!(token.len(), MAX_TOKEN_SIZE_BYTES);
        assert_eq!(parse_unverified_header(&token).unwrap().kid, "key");
    }

    #[test]
    fn test_errors_share_generic_message() {
        assert_eq!(
            TokenError::MissingKid.to_string(),
            TokenError::UnsupportedAlgorithm("HS256".into()).to_string()
        );
    }
}

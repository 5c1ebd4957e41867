//! JWKS fetching for the Cognito user pool.
//!
//! The fetcher performs a single GET against the pool's
//! `/.well-known/jwks.json` endpoint and turns the document into a map of
//! `kid` to RSA public key. Caching and refresh policy live in
//! [`crate::key_cache`]; this module only knows how to talk to the endpoint.
//!
//! # Filtering
//!
//! Entries are skipped, not treated as fatal, when they:
//! - are not `kty: "RSA"` or have an empty `kid`
//! - declare an `alg` other than `RS256` or a `use` other than `sig`
//! - carry key material that fails to decode
//!
//! A document with no usable entry left is a refresh failure.

use crate::keys::{decode_rsa_components, RsaPublicKey};
use crate::observability::metrics;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Maximum accepted JWKS response body (64 KiB).
///
/// A Cognito key set with two keys is about 1 KB. Larger bodies are refused
/// while streaming, before they are buffered in full.
pub const MAX_JWKS_SIZE_BYTES: usize = 64 * 1024;

/// JSON Web Key as published by the identity provider.
///
/// Every field is optional so that a single odd entry (an EC key, a key
/// without `kid`) never fails deserialization of the whole document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for the keys we accept).
    #[serde(default)]
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: String,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm (should be "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Key set refresh failures. Never shown to token holders.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwksError {
    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    #[error("JWKS response is malformed: {0}")]
    Malformed(String),

    #[error("JWKS contains no usable RSA signing keys")]
    NoUsableKeys,

    #[error("JWKS fetch cancelled")]
    Cancelled,
}

impl JwksError {
    /// Bounded label for metrics.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            JwksError::Transport(_) => "transport",
            JwksError::Status(_) => "status",
            JwksError::Malformed(_) => "malformed",
            JwksError::NoUsableKeys => "no_usable_keys",
            JwksError::Cancelled => "cancelled",
        }
    }
}

/// Fetches and decodes the published key set.
#[derive(Debug, Clone)]
pub struct JwksFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl JwksFetcher {
    /// Create a fetcher for `jwks_url` using the given HTTP client.
    ///
    /// The client's timeout bounds every fetch in addition to the caller's
    /// cancellation token.
    #[must_use]
    pub fn new(jwks_url: String, http_client: reqwest::Client) -> Self {
        Self {
            jwks_url,
            http_client,
        }
    }

    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch the key set, aborting early if `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `JwksError` on transport failure, non-200 status, malformed
    /// body, a document without usable keys, or cancellation.
    #[instrument(skip_all)]
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Arc<RsaPublicKey>>, JwksError> {
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(JwksError::Cancelled),
            result = self.fetch_document() => result.and_then(|doc| build_key_map(&doc)),
        };

        match &result {
            Ok(keys) => {
                tracing::info!(target: "auth.jwks", key_count = keys.len(), "JWKS fetched");
                metrics::record_jwks_refresh("success", None, start.elapsed());
            }
            Err(JwksError::Cancelled) => {
                tracing::debug!(target: "auth.jwks", "JWKS fetch cancelled by caller");
                metrics::record_jwks_refresh("cancelled", None, start.elapsed());
            }
            Err(e) => {
                tracing::error!(target: "auth.jwks", error = %e, url = %self.jwks_url, "JWKS fetch failed");
                metrics::record_jwks_refresh("error", Some(e.as_label()), start.elapsed());
            }
        }

        result
    }

    async fn fetch_document(&self) -> Result<JwksDocument, JwksError> {
        tracing::debug!(target: "auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let mut response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(JwksError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_JWKS_SIZE_BYTES as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| JwksError::Transport(e.to_string()))?
        {
            if body.len() + chunk.len() > MAX_JWKS_SIZE_BYTES {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body).map_err(|e| JwksError::Malformed(e.to_string()))
    }
}

fn too_large() -> JwksError {
    tracing::warn!(
        target: "auth.jwks",
        max_size = MAX_JWKS_SIZE_BYTES,
        "JWKS response exceeds maximum allowed size"
    );
    JwksError::Malformed(format!("body exceeds {MAX_JWKS_SIZE_BYTES} bytes"))
}

/// Turn a JWKS document into a `kid` to key map, skipping unusable entries.
///
/// # Errors
///
/// Returns `JwksError::NoUsableKeys` if nothing survives filtering.
pub fn build_key_map(doc: &JwksDocument) -> Result<HashMap<String, Arc<RsaPublicKey>>, JwksError> {
    let mut keys = HashMap::with_capacity(doc.keys.len());

    for jwk in &doc.keys {
        if jwk.kty != "RSA" || jwk.kid.is_empty() {
            tracing::debug!(target: "auth.jwks", kty = %jwk.kty, "Skipping non-RSA or unnamed JWK");
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            tracing::debug!(target: "auth.jwks", kid = %jwk.kid, alg = ?jwk.alg, "Skipping JWK with unsupported alg");
            continue;
        }
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            tracing::debug!(target: "auth.jwks", kid = %jwk.kid, key_use = ?jwk.key_use, "Skipping non-signing JWK");
            continue;
        }

        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            tracing::warn!(target: "auth.jwks", kid = %jwk.kid, "RSA JWK missing n or e");
            continue;
        };

        match decode_rsa_components(n, e) {
            Ok(key) => {
                keys.insert(jwk.kid.clone(), Arc::new(key));
            }
            Err(err) => {
                tracing::warn!(target: "auth.jwks", kid = %jwk.kid, error = %err, "Skipping undecodable RSA JWK");
            }
        }
    }

    if keys.is_empty() {
        return Err(JwksError::NoUsableKeys);
    }

    Ok(keys)
}

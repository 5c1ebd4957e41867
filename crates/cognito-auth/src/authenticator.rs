//! Authenticator façade.
//!
//! The only interface request handlers consume. One verification walks
//! `header parsed -> key resolved -> signature checked -> claims checked` and
//! ends in an [`Identity`] or an [`AuthError`]. All internal errors are logged
//! at debug level and collapsed to the two external kinds here.

use crate::claims::Identity;
use crate::config::{AuthConfig, ConfigError};
use crate::errors::AuthError;
use crate::jwks::JwksFetcher;
use crate::key_cache::{KeyCache, KeyLookupError};
use crate::observability::metrics;
use crate::token::parse_unverified_header;
use crate::verifier::ClaimsVerifier;
use async_trait::async_trait;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Validates bearer tokens and surfaces the associated identity.
///
/// Object safe so the routing layer can hold an `Arc<dyn Authenticator>`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `token` and return the caller's identity.
    ///
    /// `cancel` is the request's cancellation signal; it aborts a JWKS
    /// refresh this call may be waiting on or performing.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` when no valid credential was presented, `Forbidden`
    /// when a valid credential violates policy.
    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<Identity, AuthError>;
}

/// Cognito user-pool authenticator. Share one instance across all requests.
#[derive(Debug)]
pub struct CognitoAuthenticator {
    verifier: ClaimsVerifier,
    key_cache: KeyCache,
}

impl CognitoAuthenticator {
    /// Validate `config` and build the authenticator with an empty key cache.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails or the HTTP client cannot be
    /// built.
    pub fn new(config: AuthConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let fetcher = JwksFetcher::new(config.jwks_url(), config.build_http_client()?);
        let key_cache = KeyCache::from_config(fetcher, &config);

        tracing::info!(
            target: "auth.authenticator",
            issuer = %config.issuer(),
            jwks_url = %config.jwks_url(),
            clients = config.app_client_ids.len(),
            token_use = %config.token_use,
            "Cognito authenticator configured"
        );

        Ok(Self {
            verifier: ClaimsVerifier::new(&config),
            key_cache,
        })
    }

    /// Build from environment variables; `Ok(None)` when authentication is
    /// not configured for this deployment.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_vars`] and [`CognitoAuthenticator::new`].
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        AuthConfig::from_env()?.map(Self::new).transpose()
    }

    /// Populate the key cache ahead of the first request.
    ///
    /// Failure is not fatal: requests will retry the fetch on demand.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure so the caller can decide whether to log or
    /// abort startup.
    pub async fn warm_up(&self, cancel: &CancellationToken) -> Result<usize, KeyLookupError> {
        match self.key_cache.force_refresh(cancel).await {
            Ok(count) => {
                tracing::info!(target: "auth.authenticator", key_count = count, "JWKS cache warmed");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(target: "auth.authenticator", error = %e, "JWKS warm-up failed, will fetch on demand");
                Err(e)
            }
        }
    }

    /// The key cache, for health reporting.
    #[must_use]
    pub fn key_cache(&self) -> &KeyCache {
        &self.key_cache
    }

    async fn verify(&self, cancel: &CancellationToken, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();

        let header = parse_unverified_header(token).map_err(|e| {
            tracing::debug!(target: "auth.authenticator", error = ?e, "Token header rejected");
            AuthError::Unauthenticated
        })?;

        let key = self
            .key_cache
            .resolve(&header.kid, cancel)
            .await
            .map_err(|e| {
                tracing::debug!(target: "auth.authenticator", kid = %header.kid, error = %e, "Signing key unavailable");
                AuthError::Unauthenticated
            })?;

        let claims = self
            .verifier
            .verify(token, &key)
            .map_err(|_| AuthError::Unauthenticated)?;

        let client_id = self.verifier.check_policy(&claims).map_err(|e| {
            tracing::debug!(target: "auth.authenticator", error = %e, "Token violates policy");
            AuthError::Forbidden
        })?;

        Identity::from_claims(claims, client_id).ok_or_else(|| {
            tracing::debug!(target: "auth.authenticator", "Token exp not representable");
            AuthError::Unauthenticated
        })
    }
}

#[async_trait]
impl Authenticator for CognitoAuthenticator {
    #[instrument(skip_all)]
    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<Identity, AuthError> {
        let start = Instant::now();
        let result = self.verify(cancel, token).await;

        let outcome = match &result {
            Ok(_) => "accepted",
            Err(e) => e.as_label(),
        };
        metrics::record_token_validation(outcome, start.elapsed());
        tracing::debug!(target: "auth.authenticator", outcome, "Token validation finished");

        result
    }
}

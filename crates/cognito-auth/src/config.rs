//! Authenticator configuration.
//!
//! Built programmatically with [`AuthConfig::new`] and the `with_*` setters, or
//! loaded from environment variables via [`AuthConfig::from_env`]. Either way
//! the config must pass [`AuthConfig::validate`] before use, which trims
//! inputs, derives the region from the pool id and fills in defaults.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default expected `token_use` claim.
pub const DEFAULT_TOKEN_USE: &str = "access";

/// Default JWKS cache TTL (12 hours). Cognito rotates signing keys rarely and
/// publishes the next key well before it is used.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default ceiling on how long past its deadline a cached key may still be
/// served while the JWKS endpoint is failing (24 hours).
pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default minimum age of a fresh cache before an unknown `kid` may trigger
/// another fetch.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default HTTP timeout for the JWKS request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`crate::CognitoAuthenticator`].
#[derive(Clone)]
pub struct AuthConfig {
    /// Cognito user pool id, e.g. `us-east-1_AbCdEf123`.
    pub user_pool_id: String,

    /// AWS region of the pool. Empty means "derive from the pool id prefix".
    pub region: String,

    /// App client ids allowed to present tokens. Must be non-empty.
    pub app_client_ids: Vec<String>,

    /// JWKS endpoint override. Defaults to the pool's well-known URL.
    pub jwks_url: Option<String>,

    /// Expected `token_use` claim (compared case-insensitively).
    pub token_use: String,

    /// How long a fetched key set is considered fresh.
    pub cache_ttl: Duration,

    /// How long past its deadline a key may be served if refreshes fail.
    pub max_stale: Duration,

    /// Minimum age of a fresh key set before an unknown `kid` triggers a fetch.
    pub min_refresh_interval: Duration,

    /// Timeout applied to the default HTTP client.
    pub http_timeout: Duration,

    /// HTTP client used for JWKS fetches. Built from `http_timeout` if unset.
    pub http_client: Option<reqwest::Client>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("user_pool_id", &self.user_pool_id)
            .field("region", &self.region)
            .field("app_client_ids", &self.app_client_ids)
            .field("jwks_url", &self.jwks_url)
            .field("token_use", &self.token_use)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_stale", &self.max_stale)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("http_timeout", &self.http_timeout)
            .field("http_client", &self.http_client.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cognito user pool id is required")]
    MissingUserPoolId,

    #[error("Cognito region is required and could not be derived from pool id '{0}'")]
    MissingRegion(String),

    #[error("At least one Cognito app client id is required")]
    MissingClientIds,

    #[error("Invalid duration for {var}: {reason}")]
    InvalidDuration { var: String, reason: String },

    #[error("Failed to build JWKS HTTP client: {0}")]
    HttpClient(String),
}

impl AuthConfig {
    /// Create a config with defaults for everything but the pool and clients.
    pub fn new<I, S>(user_pool_id: impl Into<String>, app_client_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_pool_id: user_pool_id.into(),
            region: String::new(),
            app_client_ids: app_client_ids.into_iter().map(Into::into).collect(),
            jwks_url: None,
            token_use: DEFAULT_TOKEN_USE.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            max_stale: DEFAULT_MAX_STALE,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            http_client: None,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    #[must_use]
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_token_use(mut self, token_use: impl Into<String>) -> Self {
        self.token_use = token_use.into();
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Normalize and check the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the pool id or client ids are missing, or
    /// when no region is set and none can be derived from the pool id.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.user_pool_id = self.user_pool_id.trim().to_string();
        if self.user_pool_id.is_empty() {
            return Err(ConfigError::MissingUserPoolId);
        }

        self.region = self.region.trim().to_string();
        if self.region.is_empty() {
            self.region = derive_region(&self.user_pool_id)
                .ok_or_else(|| ConfigError::MissingRegion(self.user_pool_id.clone()))?;
        }

        self.app_client_ids = self
            .app_client_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .collect();
        if self.app_client_ids.is_empty() {
            return Err(ConfigError::MissingClientIds);
        }

        self.token_use = self.token_use.trim().to_string();
        if self.token_use.is_empty() {
            self.token_use = DEFAULT_TOKEN_USE.to_string();
        }

        if self.cache_ttl.is_zero() {
            self.cache_ttl = DEFAULT_CACHE_TTL;
        }
        if self.http_timeout.is_zero() {
            self.http_timeout = DEFAULT_HTTP_TIMEOUT;
        }

        self.jwks_url = match self.jwks_url.take().map(|url| url.trim().to_string()) {
            Some(url) if !url.is_empty() => Some(url),
            _ => Some(format!("{}/.well-known/jwks.json", self.issuer())),
        };

        Ok(self)
    }

    /// The `iss` value every accepted token must carry.
    #[must_use]
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// JWKS endpoint, defaulted from the issuer when no override is set.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.issuer()))
    }

    /// The configured HTTP client, or a fresh one honouring `http_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the TLS backend fails to initialize.
    pub fn build_http_client(&self) -> Result<reqwest::Client, ConfigError> {
        if let Some(client) = &self.http_client {
            return Ok(client.clone());
        }
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `COGNITO_USER_POOL_ID` is unset or blank, which
    /// means authentication is disabled for this deployment.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_vars`].
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the pool is set without client ids, a duration
    /// variable is not a positive integer, or validation fails.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Option<Self>, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        let Some(user_pool_id) = get("COGNITO_USER_POOL_ID") else {
            return Ok(None);
        };

        let client_ids: Vec<String> = get("COGNITO_APP_CLIENT_IDS")
            .map(|raw| raw.split(',').map(ToString::to_string).collect())
            .unwrap_or_default();

        let mut config = AuthConfig::new(user_pool_id, client_ids);

        if let Some(region) = get("COGNITO_REGION")
            .or_else(|| get("AWS_REGION"))
            .or_else(|| get("AWS_DEFAULT_REGION"))
        {
            config.region = region;
        }
        config.jwks_url = get("COGNITO_JWKS_URL");
        if let Some(token_use) = get("COGNITO_TOKEN_USE") {
            config.token_use = token_use;
        }
        if let Some(ttl) = parse_seconds(vars, "COGNITO_JWKS_CACHE_TTL_SECONDS")? {
            config.cache_ttl = ttl;
        }
        if let Some(max_stale) = parse_seconds(vars, "COGNITO_JWKS_MAX_STALE_SECONDS")? {
            config.max_stale = max_stale;
        }
        if let Some(timeout) = parse_seconds(vars, "COGNITO_JWKS_TIMEOUT_SECONDS")? {
            config.http_timeout = timeout;
        }

        config.validate().map(Some)
    }
}

/// Cognito pool ids are `<region>_<suffix>`.
fn derive_region(user_pool_id: &str) -> Option<String> {
    let (region, suffix) = user_pool_id.split_once('_')?;
    let region = region.trim();
    if region.is_empty() || suffix.trim().is_empty() {
        return None;
    }
    Some(region.to_string())
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    var: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value_str) = vars.get(var).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let value: u64 = value_str
        .parse()
        .map_err(|e| ConfigError::InvalidDuration {
            var: var.to_string(),
            reason: format!("must be a positive integer, got '{value_str}': {e}"),
        })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration {
            var: var.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(Some(Duration::from_secs(value)))
}

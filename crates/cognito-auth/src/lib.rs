//! Bearer-token authentication against a Cognito user pool.
//!
//! Verifies RS256-signed JWTs using the pool's published JWKS and projects the
//! verified claims into an [`Identity`]. Callers see exactly two failure kinds,
//! [`AuthError::Unauthenticated`] and [`AuthError::Forbidden`].
//!
//! # Components
//!
//! - `keys` - RSA public key reconstruction from JWK modulus/exponent
//! - `jwks` - JWKS document fetching and filtering
//! - `key_cache` - `kid` to key cache with single-flight refresh and stale fallback
//! - `token` - unverified header parsing (`kid`, `alg`)
//! - `verifier` - signature, expiry, issuer and policy checks
//! - `authenticator` - the façade consumed by request handlers
//!
//! # Usage
//!
//! ```rust,ignore
//! use cognito_auth::{AuthConfig, Authenticator, CognitoAuthenticator};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AuthConfig::new("us-east-1_example", ["client-123"]);
//! let authenticator = CognitoAuthenticator::new(config)?;
//!
//! let identity = authenticator
//!     .authenticate(&CancellationToken::new(), bearer_token)
//!     .await?;
//! ```

#![warn(clippy::pedantic)]

pub mod authenticator;
pub mod claims;
pub mod config;
pub mod errors;
pub mod jwks;
pub mod key_cache;
pub mod keys;
pub mod observability;
pub mod token;
pub mod verifier;

pub use authenticator::{Authenticator, CognitoAuthenticator};
pub use claims::{Identity, VerifiedClaims};
pub use config::{AuthConfig, ConfigError};
pub use errors::AuthError;
pub use key_cache::KeyCache;

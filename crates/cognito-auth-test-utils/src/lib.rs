//! # Cognito Auth Test Utilities
//!
//! Shared test utilities for the `cognito-auth` crate.
//!
//! This crate provides:
//! - Fixed RSA keypairs and their JWK forms (primary and rotated)
//! - A builder for signed Cognito-style tokens (TestTokenBuilder)
//! - A mock JWKS endpoint (MockJwksServer)
//! - Fixed test ids (pool, issuer, clients, users)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cognito_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = MockJwksServer::start().await;
//!     server.serve_keypairs(&[&TestKeypair::primary()]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .sign(&TestKeypair::primary());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use test_ids::*;
pub use token_builders::*;

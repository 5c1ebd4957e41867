//! Builder for signed test tokens
//!
//! Produces compact RS256 JWTs shaped like Cognito access tokens. Every
//! default matches the fixed ids in [`crate::test_ids`], so a token built with
//! no overrides is accepted by an authenticator configured for
//! `TEST_USER_POOL_ID` and `TEST_CLIENT_ID`.

use crate::crypto_fixtures::TestKeypair;
use crate::test_ids::{TEST_CLIENT_ID, TEST_ISSUER, TEST_SUBJECT_ALICE};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for Cognito-style test JWTs
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_groups(&["admins"])
///     .expires_in(3600)
///     .sign(&TestKeypair::primary());
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid: Option<String>,
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTokenBuilder {
    /// Create a builder for a valid access token issued one second ago.
    pub fn new() -> Self {
        let now = Utc::now();
        let claims = json!({
            "sub": TEST_SUBJECT_ALICE,
            "username": "alice",
            "client_id": TEST_CLIENT_ID,
            "token_use": "access",
            "scope": "aws.cognito.signin.user.admin",
            "iss": TEST_ISSUER,
            "iat": (now - Duration::seconds(1)).timestamp(),
            "auth_time": (now - Duration::seconds(1)).timestamp(),
            "exp": (now + Duration::seconds(3600)).timestamp(),
            "jti": "test-jti-0001",
            "origin_jti": "test-origin-jti-0001",
        });

        let Value::Object(claims) = claims else {
            unreachable!("json! object literal")
        };
        Self { claims, kid: None }
    }

    /// Set the username.
    pub fn for_user(self, username: &str) -> Self {
        self.with_claim("username", json!(username))
    }

    /// Set the subject.
    pub fn with_subject(self, sub: &str) -> Self {
        self.with_claim("sub", json!(sub))
    }

    pub fn with_email(self, email: &str) -> Self {
        self.with_claim("email", json!(email))
    }

    pub fn with_client_id(self, client_id: &str) -> Self {
        self.with_claim("client_id", json!(client_id))
    }

    pub fn with_token_use(self, token_use: &str) -> Self {
        self.with_claim("token_use", json!(token_use))
    }

    pub fn with_issuer(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set the `cognito:groups` claim.
    pub fn with_groups(self, groups: &[&str]) -> Self {
        self.with_claim("cognito:groups", json!(groups))
    }

    /// Set the scope (space-separated).
    pub fn with_scope(self, scope: &str) -> Self {
        self.with_claim("scope", json!(scope))
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    /// Override the header `kid` instead of using the signing keypair's.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Set or replace an arbitrary claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim entirely.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// The claim set as built so far.
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with RS256 using `keypair`.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub fn sign(&self, keypair: &TestKeypair) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone().unwrap_or_else(|| keypair.kid.clone()));
        encode(&header, &self.claims, &keypair.encoding_key()).expect("test token signing")
    }

    /// Sign with HS256 using `secret` (algorithm confusion tests).
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub fn sign_hs256(&self, kid: &str, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, &self.claims, &EncodingKey::from_secret(secret))
            .expect("test token signing")
    }

    /// An unsigned token with `alg: none`.
    pub fn unsigned(&self, kid: &str) -> String {
        let header = json!({ "alg": "none", "typ": "JWT", "kid": kid });
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.claims().to_string())
        )
    }
}

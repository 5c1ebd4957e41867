//! Mock JWKS endpoint
//!
//! Wraps a wiremock `MockServer` that answers `GET /.well-known/jwks.json`
//! the way a Cognito user pool does. Expectations set through the
//! `*_expecting` methods are checked by [`MockJwksServer::verify`] and again
//! when the server is dropped.

use crate::crypto_fixtures::{jwks_document, TestKeypair};
use crate::test_ids::TEST_JWKS_PATH;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock JWKS endpoint for a test user pool
///
/// # Example
/// ```rust,ignore
/// let server = MockJwksServer::start().await;
/// server.serve_keys_expecting(&[TEST_KID], 1).await;
/// let config = AuthConfig::new(TEST_USER_POOL_ID, [TEST_CLIENT_ID])
///     .with_jwks_url(server.jwks_url());
/// ```
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server with no routes mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URI of the server.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Full JWKS URL to configure the authenticator with.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), TEST_JWKS_PATH)
    }

    /// Serve the primary key material under each of `kids`.
    pub async fn serve_keys(&self, kids: &[&str]) {
        self.mount(ResponseTemplate::new(200).set_body_json(keys_for(kids)), None)
            .await;
    }

    /// Like [`Self::serve_keys`], failing verification unless exactly
    /// `times` requests arrive.
    pub async fn serve_keys_expecting(&self, kids: &[&str], times: u64) {
        self.mount(
            ResponseTemplate::new(200).set_body_json(keys_for(kids)),
            Some(times),
        )
        .await;
    }

    /// Serve the primary key after `delay`, expecting exactly `times`
    /// requests. Used to hold a refresh open while concurrent callers pile up.
    pub async fn serve_keys_delayed(&self, kids: &[&str], delay: Duration, times: u64) {
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(keys_for(kids))
                .set_delay(delay),
            Some(times),
        )
        .await;
    }

    /// Serve the public halves of `keypairs` under their own kids.
    pub async fn serve_keypairs(&self, keypairs: &[&TestKeypair]) {
        self.mount(
            ResponseTemplate::new(200).set_body_json(jwks_document(keypairs)),
            None,
        )
        .await;
    }

    /// Serve an arbitrary JSON document.
    pub async fn serve_jwks(&self, body: serde_json::Value) {
        self.mount(ResponseTemplate::new(200).set_body_json(body), None)
            .await;
    }

    /// Answer every request with `status` and an empty body.
    pub async fn fail_with_status(&self, status: u16) {
        self.mount(ResponseTemplate::new(status), None).await;
    }

    /// Answer with `status` after `delay`, expecting exactly `times` requests.
    pub async fn fail_with_status_delayed(&self, status: u16, delay: Duration, times: u64) {
        self.mount(ResponseTemplate::new(status).set_delay(delay), Some(times))
            .await;
    }

    /// Remove all mounted routes and recorded requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Panic if any `*_expecting` expectation was not met.
    pub async fn verify(&self) {
        self.server.verify().await;
    }

    /// Number of JWKS requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    async fn mount(&self, response: ResponseTemplate, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(response);
        let mock = match times {
            Some(times) => mock.expect(times),
            None => mock,
        };
        mock.mount(&self.server).await;
    }
}

fn keys_for(kids: &[&str]) -> serde_json::Value {
    let keypairs: Vec<TestKeypair> = kids
        .iter()
        .map(|kid| TestKeypair::primary().with_kid(kid))
        .collect();
    jwks_document(&keypairs.iter().collect::<Vec<_>>())
}

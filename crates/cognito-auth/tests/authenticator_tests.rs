//! Authenticator integration tests.
//!
//! Drives `CognitoAuthenticator::authenticate` end to end against a mocked
//! Cognito JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use cognito_auth::keys::decode_rsa_components;
use cognito_auth::verifier::{ClaimsVerifier, VerifyError};
use cognito_auth::{AuthConfig, AuthError, Authenticator, CognitoAuthenticator};
use cognito_auth_test_utils::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config_for(server: &MockJwksServer) -> AuthConfig {
    AuthConfig::new(TEST_USER_POOL_ID, [TEST_CLIENT_ID, TEST_MOBILE_CLIENT_ID])
        .with_jwks_url(server.jwks_url())
}

async fn authenticate(
    auth: &CognitoAuthenticator,
    token: &str,
) -> Result<cognito_auth::Identity, AuthError> {
    auth.authenticate(&CancellationToken::new(), token).await
}

// ============================================================================
// Acceptance
// ============================================================================

#[tokio::test]
async fn test_valid_token_yields_identity_matching_claims() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let builder = TestTokenBuilder::new()
        .with_subject(TEST_SUBJECT_BOB)
        .for_user("bob")
        .with_email("bob@example.com")
        .with_groups(&[GROUP_EDITORS, GROUP_ADMINS])
        .with_scope("openid aws.cognito.signin.user.admin")
        .with_client_id(TEST_MOBILE_CLIENT_ID);
    let exp = builder.claims()["exp"].as_i64().unwrap();
    let token = builder.sign(&TestKeypair::primary());

    let identity = authenticate(&auth, &token).await?;

    assert_eq!(identity.subject, TEST_SUBJECT_BOB);
    assert_eq!(identity.username, "bob");
    assert_eq!(identity.email, "bob@example.com");
    assert_eq!(identity.client_id, TEST_MOBILE_CLIENT_ID);
    assert_eq!(identity.token_use, "access");
    assert_eq!(identity.groups, vec![GROUP_EDITORS, GROUP_ADMINS]);
    assert_eq!(identity.scopes, vec!["openid", SCOPE_SIGNIN_ADMIN]);
    assert_eq!(identity.issuer, TEST_ISSUER);
    assert_eq!(identity.expires_at.timestamp(), exp);
    Ok(())
}

#[tokio::test]
async fn test_surrounding_whitespace_is_ignored() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    let identity = authenticate(&auth, &format!("  {token}\n")).await?;
    assert_eq!(identity.subject, TEST_SUBJECT_ALICE);
    Ok(())
}

#[tokio::test]
async fn test_id_token_accepted_when_configured() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server).with_token_use("id"))?;

    let token = TestTokenBuilder::new()
        .with_token_use("id")
        .without_claim("client_id")
        .without_claim("username")
        .with_claim("aud", serde_json::json!(TEST_CLIENT_ID))
        .with_claim("cognito:username", serde_json::json!("alice"))
        .with_email("alice@example.com")
        .sign(&TestKeypair::primary());

    let identity = authenticate(&auth, &token).await?;
    assert_eq!(identity.username, "alice");
    assert_eq!(identity.client_id, TEST_CLIENT_ID);
    assert_eq!(identity.token_use, "id");
    Ok(())
}

#[tokio::test]
async fn test_token_with_both_username_claims_accepted() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .for_user("bob")
        .with_claim("cognito:username", serde_json::json!("bob"))
        .sign(&TestKeypair::primary());

    let identity = authenticate(&auth, &token).await?;
    assert_eq!(identity.username, "bob");
    Ok(())
}

#[tokio::test]
async fn test_array_audience_accepted() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_claim("aud", serde_json::json!([TEST_CLIENT_ID]))
        .sign(&TestKeypair::primary());
    assert_eq!(authenticate(&auth, &token).await?.client_id, TEST_CLIENT_ID);

    let id_auth = CognitoAuthenticator::new(config_for(&server).with_token_use("id"))?;
    let token = TestTokenBuilder::new()
        .with_token_use("id")
        .without_claim("client_id")
        .with_claim("aud", serde_json::json!([OTHER_CLIENT_ID, TEST_MOBILE_CLIENT_ID]))
        .sign(&TestKeypair::primary());
    assert_eq!(
        authenticate(&id_auth, &token).await?.client_id,
        TEST_MOBILE_CLIENT_ID
    );
    Ok(())
}

#[tokio::test]
async fn test_warm_up_populates_cache() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keys_expecting(&[TEST_KID], 1).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let count = auth.warm_up(&CancellationToken::new()).await?;
    assert_eq!(count, 1);
    assert!(auth.key_cache().is_fresh().await);

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    authenticate(&auth, &token).await?;

    server.verify().await;
    Ok(())
}

// ============================================================================
// Unauthenticated
// ============================================================================

#[tokio::test]
async fn test_expired_token_unauthenticated() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .expires_in(-1)
        .sign(&TestKeypair::primary());
    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_unauthenticated() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_kid("ghost-key")
        .sign(&TestKeypair::primary());
    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_does_not_refetch_within_cooldown() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keys_expecting(&[TEST_KID], 1).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let valid = TestTokenBuilder::new().sign(&TestKeypair::primary());
    authenticate(&auth, &valid).await?;

    let ghost = TestTokenBuilder::new()
        .with_kid("ghost-key")
        .sign(&TestKeypair::primary());
    for _ in 0..5 {
        assert_eq!(
            authenticate(&auth, &ghost).await,
            Err(AuthError::Unauthenticated)
        );
    }

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_wrong_issuer_unauthenticated() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_issuer("https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_Elsewhere")
        .sign(&TestKeypair::primary());
    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    Ok(())
}

#[tokio::test]
async fn test_key_under_wrong_kid_unauthenticated() -> Result<()> {
    // Token signed by the rotated key but claiming the primary key's kid.
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_kid(TEST_KID)
        .sign(&TestKeypair::rotated());
    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    Ok(())
}

#[tokio::test]
async fn test_algorithm_confusion_rejected_before_key_lookup() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keys_expecting(&[TEST_KID], 0).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let builder = TestTokenBuilder::new();
    let hmac = builder.sign_hs256(TEST_KID, TEST_JWK_N.as_bytes());
    let unsigned = builder.unsigned(TEST_KID);

    for token in [hmac, unsigned] {
        assert_eq!(
            authenticate(&auth, &token).await,
            Err(AuthError::Unauthenticated)
        );
    }

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_tokens_unauthenticated() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keys_expecting(&[TEST_KID], 0).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let oversized = "a".repeat(17 * 1024);
    for token in ["", "   ", "abc", "a.b", "a.b.c.d", "Bearer x.y.z", oversized.as_str()] {
        assert_eq!(
            authenticate(&auth, token).await,
            Err(AuthError::Unauthenticated),
            "token {:.20}",
            token
        );
    }

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_jwks_unavailable_on_cold_cache_unauthenticated() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.fail_with_status(503).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    assert!(auth.warm_up(&CancellationToken::new()).await.is_err());
    Ok(())
}

// ============================================================================
// Forbidden
// ============================================================================

#[tokio::test]
async fn test_client_not_allow_listed_forbidden() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_client_id(OTHER_CLIENT_ID)
        .sign(&TestKeypair::primary());
    assert_eq!(authenticate(&auth, &token).await, Err(AuthError::Forbidden));

    let token = TestTokenBuilder::new()
        .without_claim("client_id")
        .sign(&TestKeypair::primary());
    assert_eq!(authenticate(&auth, &token).await, Err(AuthError::Forbidden));
    Ok(())
}

#[tokio::test]
async fn test_token_use_mismatch_forbidden() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_token_use("id")
        .sign(&TestKeypair::primary());
    assert_eq!(authenticate(&auth, &token).await, Err(AuthError::Forbidden));
    Ok(())
}

#[tokio::test]
async fn test_expired_token_with_bad_client_is_unauthenticated() -> Result<()> {
    // Cryptographic and temporal checks run before policy checks.
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let token = TestTokenBuilder::new()
        .with_client_id(OTHER_CLIENT_ID)
        .with_token_use("id")
        .expires_in(-60)
        .sign(&TestKeypair::primary());
    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    Ok(())
}

// ============================================================================
// Key rotation and staleness
// ============================================================================

#[tokio::test]
async fn test_rotated_key_picked_up_on_unknown_kid() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(
        config_for(&server).with_min_refresh_interval(Duration::ZERO),
    )?;

    let old = TestTokenBuilder::new().sign(&TestKeypair::primary());
    authenticate(&auth, &old).await?;

    server.reset().await;
    server
        .serve_keypairs(&[&TestKeypair::primary(), &TestKeypair::rotated()])
        .await;

    let new = TestTokenBuilder::new().sign(&TestKeypair::rotated());
    authenticate(&auth, &new).await?;
    authenticate(&auth, &old).await?;

    assert_eq!(
        auth.key_cache().cached_key_ids().await,
        vec![TEST_KID.to_string(), ROTATED_KID.to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_stale_key_served_when_refresh_fails() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(
        config_for(&server).with_cache_ttl(Duration::from_millis(200)),
    )?;

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    authenticate(&auth, &token).await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!auth.key_cache().is_fresh().await);

    server.reset().await;
    server.fail_with_status(500).await;

    let identity = authenticate(&auth, &token).await?;
    assert_eq!(identity.subject, TEST_SUBJECT_ALICE);
    assert!(server.request_count().await >= 1);
    Ok(())
}

#[tokio::test]
async fn test_stale_key_refused_past_ceiling() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;
    let auth = CognitoAuthenticator::new(
        config_for(&server)
            .with_cache_ttl(Duration::from_millis(100))
            .with_max_stale(Duration::from_millis(100)),
    )?;

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    authenticate(&auth, &token).await?;

    tokio::time::sleep(Duration::from_millis(350)).await;
    server.reset().await;
    server.fail_with_status(500).await;

    assert_eq!(
        authenticate(&auth, &token).await,
        Err(AuthError::Unauthenticated)
    );
    Ok(())
}

#[tokio::test]
async fn test_maximal_cache_durations_from_env_accept_tokens() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keypairs(&[&TestKeypair::primary()]).await;

    let vars: std::collections::HashMap<String, String> = [
        ("COGNITO_USER_POOL_ID", TEST_USER_POOL_ID.to_string()),
        ("COGNITO_APP_CLIENT_IDS", TEST_CLIENT_ID.to_string()),
        ("COGNITO_JWKS_URL", server.jwks_url()),
        ("COGNITO_JWKS_CACHE_TTL_SECONDS", u64::MAX.to_string()),
        ("COGNITO_JWKS_MAX_STALE_SECONDS", u64::MAX.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let config = AuthConfig::from_vars(&vars)?.expect("pool is configured");
    let auth = CognitoAuthenticator::new(config)?;

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    authenticate(&auth, &token).await?;
    authenticate(&auth, &token).await?;
    Ok(())
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_request_does_not_fetch() -> Result<()> {
    let server = MockJwksServer::start().await;
    server.serve_keys_expecting(&[TEST_KID], 0).await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());
    assert_eq!(
        auth.authenticate(&cancel, &token).await,
        Err(AuthError::Unauthenticated)
    );

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_cancel_mid_fetch_then_retry_succeeds() -> Result<()> {
    let server = MockJwksServer::start().await;
    server
        .serve_keys_delayed(&[TEST_KID], Duration::from_millis(500), 2)
        .await;
    let auth = CognitoAuthenticator::new(config_for(&server))?;
    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    assert_eq!(
        auth.authenticate(&cancel, &token).await,
        Err(AuthError::Unauthenticated)
    );
    assert!(auth.key_cache().cached_key_ids().await.is_empty());

    authenticate(&auth, &token).await?;

    server.verify().await;
    Ok(())
}

// ============================================================================
// Key material
// ============================================================================

#[test]
fn test_published_key_verifies_and_single_bit_flip_does_not() {
    let config = AuthConfig::new(TEST_USER_POOL_ID, [TEST_CLIENT_ID])
        .validate()
        .unwrap();
    let verifier = ClaimsVerifier::new(&config);
    let token = TestTokenBuilder::new().sign(&TestKeypair::primary());

    let key = decode_rsa_components(TEST_JWK_N, TEST_JWK_E).unwrap();
    assert_eq!(key.modulus_bits(), 2048);
    assert!(verifier.verify(&token, &key).is_ok());

    let mut modulus = URL_SAFE_NO_PAD.decode(TEST_JWK_N).unwrap();
    *modulus.get_mut(128).unwrap() ^= 0x10;
    let flipped = decode_rsa_components(&URL_SAFE_NO_PAD.encode(&modulus), TEST_JWK_E).unwrap();
    assert_eq!(
        verifier.verify(&token, &flipped).unwrap_err(),
        VerifyError::InvalidSignature
    );
}

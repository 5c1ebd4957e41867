//! Metrics definitions for the authenticator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `status`: success, error, cancelled
//! - `error_type`: `JwksError::as_label` values
//! - `outcome`: accepted, unauthenticated, forbidden
//!
//! Recording is a no-op until the embedding service installs a recorder.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a JWKS fetch.
///
/// Metric: `auth_jwks_refresh_total`, `auth_jwks_refresh_duration_seconds`,
/// `auth_jwks_refresh_failures_total` (on failure only)
pub fn record_jwks_refresh(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("auth_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("auth_jwks_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);

    if let Some(err_type) = error_type {
        counter!("auth_jwks_refresh_failures_total",
            "error_type" => err_type.to_string()
        )
        .increment(1);
    }
}

/// Record that a cached key was served after a failed refresh.
///
/// Metric: `auth_jwks_stale_keys_served_total`
pub fn record_stale_key_served() {
    counter!("auth_jwks_stale_keys_served_total").increment(1);
}

/// Record the outcome of one `authenticate` call.
///
/// Metric: `auth_token_validations_total`, `auth_token_validation_duration_seconds`
/// Labels: `outcome`
pub fn record_token_validation(outcome: &str, duration: Duration) {
    histogram!("auth_token_validation_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("auth_token_validations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

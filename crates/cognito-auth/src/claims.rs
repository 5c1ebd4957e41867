//! Verified claim set and the caller identity projected from it.
//!
//! `sub` and `email` identify a person and are redacted from `Debug` output
//! on both types so an identity can be logged without leaking them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Claims of a Cognito access or ID token, available only after signature,
/// issuer and expiry checks have passed.
#[derive(Clone, Deserialize)]
pub struct VerifiedClaims {
    /// Subject (Cognito user UUID) - redacted in Debug output.
    #[serde(default)]
    pub sub: String,

    /// Cognito username as carried by access tokens.
    #[serde(default)]
    pub username: String,

    /// `cognito:username`, carried by ID tokens instead of `username`.
    #[serde(default, rename = "cognito:username")]
    pub cognito_username: Option<String>,

    /// Email address (ID tokens, or access tokens with the email scope) -
    /// redacted in Debug output.
    #[serde(default)]
    pub email: String,

    /// App client the access token was issued to.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Audience, a single string or an array; ID tokens carry the app client
    /// id here instead of `client_id`.
    #[serde(default, deserialize_with = "string_or_seq")]
    pub aud: Vec<String>,

    /// Token class: "access" or "id".
    #[serde(default)]
    pub token_use: Option<String>,

    /// Cognito group memberships in token order.
    #[serde(default, rename = "cognito:groups")]
    pub groups: Vec<String>,

    /// Space-separated OAuth scopes.
    #[serde(default)]
    pub scope: String,

    /// Issuer URL.
    #[serde(default)]
    pub iss: String,

    /// Expiration timestamp (Unix epoch seconds).
    ///
    /// Defaulted so that a missing `exp` surfaces as a required-claim
    /// failure from validation rather than a deserialization error.
    #[serde(default)]
    pub exp: i64,

    /// Every other claim carried by the token.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("sub", &"[REDACTED]")
            .field("username", &self.username)
            .field("cognito_username", &self.cognito_username)
            .field("email", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("aud", &self.aud)
            .field("token_use", &self.token_use)
            .field("groups", &self.groups)
            .field("scope", &self.scope)
            .field("iss", &self.iss)
            .field("exp", &self.exp)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(aud)) => vec![aud],
        Some(OneOrMany::Many(auds)) => auds,
    })
}

impl VerifiedClaims {
    /// Candidate app client ids: `client_id` when present (access tokens),
    /// otherwise every non-empty `aud` entry (ID tokens).
    pub fn client_candidates(&self) -> impl Iterator<Item = &str> {
        let client_id = self.client_id.as_deref().filter(|c| !c.is_empty());
        let audiences = self
            .aud
            .iter()
            .map(String::as_str)
            .filter(move |a| client_id.is_none() && !a.is_empty());
        client_id.into_iter().chain(audiences)
    }

    /// The first client candidate, for display.
    #[must_use]
    pub fn client(&self) -> Option<&str> {
        self.client_candidates().next()
    }

    /// `username`, falling back to `cognito:username` when empty.
    #[must_use]
    pub fn username(&self) -> &str {
        if self.username.is_empty() {
            self.cognito_username.as_deref().unwrap_or_default()
        } else {
            &self.username
        }
    }

    /// Scopes as individual tokens.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }
}

/// The authenticated caller.
///
/// Built fresh for every successful verification; request handlers use
/// `subject` as the stable user key.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub username: String,
    pub email: String,
    pub client_id: String,
    pub token_use: String,
    pub groups: Vec<String>,
    pub scopes: Vec<String>,
    pub issuer: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &"[REDACTED]")
            .field("username", &self.username)
            .field("email", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("token_use", &self.token_use)
            .field("groups", &self.groups)
            .field("scopes", &self.scopes)
            .field("issuer", &self.issuer)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Identity {
    /// Project verified claims into an identity for the accepted
    /// `client_id`.
    ///
    /// Returns `None` if `exp` cannot be represented as a timestamp.
    #[must_use]
    pub fn from_claims(claims: VerifiedClaims, client_id: String) -> Option<Self> {
        let expires_at = DateTime::from_timestamp(claims.exp, 0)?;
        let username = claims.username().to_string();
        let scopes = claims.scopes().into_iter().map(ToString::to_string).collect();

        Some(Self {
            subject: claims.sub,
            username,
            email: claims.email,
            client_id,
            token_use: claims.token_use.unwrap_or_default(),
            groups: claims.groups,
            scopes,
            issuer: claims.iss,
            expires_at,
        })
    }

    /// Check whether the identity was granted `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Check whether the identity belongs to the Cognito group `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

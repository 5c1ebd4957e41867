//! `kid` to public key cache with single-flight refresh.
//!
//! # Concurrency
//!
//! The current key set is an immutable [`KeySnapshot`] behind an `Arc`,
//! swapped wholesale on refresh, so readers never see a half-built map.
//! Lookups take the read lock only long enough to clone the `Arc`.
//!
//! Refreshes are serialized by a separate mutex held across the network call.
//! A caller that had to wait for that mutex re-checks the refresh-attempt
//! counter once it holds it: if another caller finished a fetch in the
//! meantime (successfully or not) it answers from that outcome instead of
//! fetching again. N concurrent cold-cache lookups therefore cost exactly one
//! request to the JWKS endpoint.
//!
//! # Failure policy
//!
//! - Fetch succeeds: the whole map is replaced and the deadline moves to
//!   `now + ttl`. Keys missing from the new document are gone.
//! - Fetch fails: a previously cached key for the requested `kid` is still
//!   served until `deadline + max_stale`, after which it is refused.
//! - A fetching caller that is cancelled does not count as an attempt, so the
//!   next waiter fetches for itself.

use crate::config::{
    AuthConfig, DEFAULT_CACHE_TTL, DEFAULT_MAX_STALE, DEFAULT_MIN_REFRESH_INTERVAL,
};
use crate::jwks::{JwksError, JwksFetcher};
use crate::keys::RsaPublicKey;
use crate::observability::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Key lookup failures. The authenticator maps all of them to
/// `AuthError::Unauthenticated`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyLookupError {
    #[error("signing key '{0}' is not published by the issuer")]
    UnknownKey(String),

    #[error("key set refresh failed: {0}")]
    Refresh(#[from] JwksError),

    #[error("cached signing key exceeded the staleness ceiling")]
    TooStale,

    #[error("key lookup cancelled")]
    Cancelled,
}

/// Immutable view of one successfully fetched key set.
#[derive(Debug)]
pub struct KeySnapshot {
    keys: HashMap<String, Arc<RsaPublicKey>>,
    fetched_at: Instant,
    /// `None` when `fetched_at + ttl` is not representable; such a snapshot
    /// never expires.
    expires_at: Option<Instant>,
}

impl KeySnapshot {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }

    fn within_stale_ceiling(&self, now: Instant, max_stale: Duration) -> bool {
        self.expires_at
            .and_then(|deadline| deadline.checked_add(max_stale))
            .map_or(true, |ceiling| now < ceiling)
    }

    fn get(&self, kid: &str) -> Option<Arc<RsaPublicKey>> {
        self.keys.get(kid).cloned()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Option<Arc<KeySnapshot>>,
    /// Completed (not cancelled) fetch attempts, successful or not.
    refresh_attempts: u64,
}

/// Thread-safe JWKS key cache.
#[derive(Debug)]
pub struct KeyCache {
    fetcher: JwksFetcher,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
    cache_ttl: Duration,
    max_stale: Duration,
    min_refresh_interval: Duration,
}

impl KeyCache {
    /// Create an empty cache with default TTL and staleness policy.
    #[must_use]
    pub fn new(fetcher: JwksFetcher) -> Self {
        Self {
            fetcher,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
            cache_ttl: DEFAULT_CACHE_TTL,
            max_stale: DEFAULT_MAX_STALE,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    /// Create an empty cache using the TTL and staleness settings of `config`.
    #[must_use]
    pub fn from_config(fetcher: JwksFetcher, config: &AuthConfig) -> Self {
        Self::new(fetcher)
            .with_ttl(config.cache_ttl)
            .with_max_stale(config.max_stale)
            .with_min_refresh_interval(config.min_refresh_interval)
    }

    /// How long a fetched key set is considered fresh.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// How long past its deadline a cached key may be served while refreshes
    /// fail.
    #[must_use]
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    /// Minimum age of a fresh key set before an unknown `kid` triggers a fetch.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Resolve the public key for `kid`, refreshing the key set if needed.
    ///
    /// # Errors
    ///
    /// - `UnknownKey` if the key is not in the current (fresh) key set
    /// - `Refresh` if a fetch failed and no usable cached key exists
    /// - `TooStale` if the only cached key is past the staleness ceiling
    /// - `Cancelled` if `cancel` fired while waiting or fetching
    #[instrument(skip(self, cancel), fields(kid = %kid))]
    pub async fn resolve(
        &self,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<RsaPublicKey>, KeyLookupError> {
        let (snapshot, observed_attempts) = self.current().await;
        if let Some(snapshot) = &snapshot {
            if snapshot.is_fresh(Instant::now()) {
                if let Some(key) = snapshot.get(kid) {
                    tracing::trace!(target: "auth.cache", "JWKS cache hit");
                    return Ok(key);
                }
            }
        }

        let _refresh_guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(KeyLookupError::Cancelled),
            guard = self.refresh_lock.lock() => guard,
        };

        // Re-check now that we hold the refresh lock.
        let (snapshot, attempts) = self.current().await;
        let now = Instant::now();

        if attempts != observed_attempts {
            tracing::debug!(target: "auth.cache", "Key set refreshed while waiting, reusing outcome");
            return self.lookup_existing(snapshot.as_deref(), kid, now);
        }

        if let Some(snapshot) = &snapshot {
            if snapshot.is_fresh(now) {
                if let Some(key) = snapshot.get(kid) {
                    return Ok(key);
                }
                if now.duration_since(snapshot.fetched_at) < self.min_refresh_interval {
                    tracing::debug!(target: "auth.cache", "Unknown kid on recently fetched key set, not refetching");
                    return Err(KeyLookupError::UnknownKey(kid.to_string()));
                }
            }
        }

        match self.fetcher.fetch(cancel).await {
            Ok(keys) => {
                let fresh = self.install(keys).await;
                fresh.get(kid).ok_or_else(|| {
                    tracing::warn!(target: "auth.cache", "Key not found in JWKS after refresh");
                    KeyLookupError::UnknownKey(kid.to_string())
                })
            }
            Err(JwksError::Cancelled) => Err(KeyLookupError::Cancelled),
            Err(err) => {
                self.state.write().await.refresh_attempts += 1;
                match self.stale_fallback(snapshot.as_deref(), kid, Instant::now()) {
                    Some(result) => result,
                    None => Err(KeyLookupError::Refresh(err)),
                }
            }
        }
    }

    /// Fetch the key set unconditionally and install it.
    ///
    /// Still serialized with demand-driven refreshes, so it never overlaps one.
    ///
    /// # Errors
    ///
    /// Returns `KeyLookupError::Refresh` if the fetch fails (the previous
    /// snapshot is kept) or `Cancelled` if `cancel` fires.
    #[instrument(skip_all)]
    pub async fn force_refresh(&self, cancel: &CancellationToken) -> Result<usize, KeyLookupError> {
        let _refresh_guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(KeyLookupError::Cancelled),
            guard = self.refresh_lock.lock() => guard,
        };

        match self.fetcher.fetch(cancel).await {
            Ok(keys) => Ok(self.install(keys).await.keys.len()),
            Err(JwksError::Cancelled) => Err(KeyLookupError::Cancelled),
            Err(err) => {
                self.state.write().await.refresh_attempts += 1;
                Err(KeyLookupError::Refresh(err))
            }
        }
    }

    /// Whether a key set is cached and within its TTL.
    pub async fn is_fresh(&self) -> bool {
        let (snapshot, _) = self.current().await;
        snapshot.is_some_and(|s| s.is_fresh(Instant::now()))
    }

    /// Key ids in the current snapshot, sorted.
    pub async fn cached_key_ids(&self) -> Vec<String> {
        let (snapshot, _) = self.current().await;
        let mut ids: Vec<String> = snapshot
            .map(|s| s.keys.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    async fn current(&self) -> (Option<Arc<KeySnapshot>>, u64) {
        let state = self.state.read().await;
        (state.snapshot.clone(), state.refresh_attempts)
    }

    async fn install(&self, keys: HashMap<String, Arc<RsaPublicKey>>) -> Arc<KeySnapshot> {
        let now = Instant::now();
        let snapshot = Arc::new(KeySnapshot {
            keys,
            fetched_at: now,
            expires_at: now.checked_add(self.cache_ttl),
        });

        let mut state = self.state.write().await;
        state.snapshot = Some(Arc::clone(&snapshot));
        state.refresh_attempts += 1;

        tracing::info!(
            target: "auth.cache",
            key_count = snapshot.keys.len(),
            ttl_secs = self.cache_ttl.as_secs(),
            "JWKS cache refreshed"
        );
        snapshot
    }

    /// Answer from the snapshot another caller just refreshed (or failed to).
    fn lookup_existing(
        &self,
        snapshot: Option<&KeySnapshot>,
        kid: &str,
        now: Instant,
    ) -> Result<Arc<RsaPublicKey>, KeyLookupError> {
        if let Some(snapshot) = snapshot {
            if snapshot.is_fresh(now) {
                return snapshot
                    .get(kid)
                    .ok_or_else(|| KeyLookupError::UnknownKey(kid.to_string()));
            }
        }
        self.stale_fallback(snapshot, kid, now)
            .unwrap_or_else(|| Err(KeyLookupError::UnknownKey(kid.to_string())))
    }

    /// `None` when there is no cached key for `kid` at all.
    fn stale_fallback(
        &self,
        snapshot: Option<&KeySnapshot>,
        kid: &str,
        now: Instant,
    ) -> Option<Result<Arc<RsaPublicKey>, KeyLookupError>> {
        let snapshot = snapshot?;
        let key = snapshot.get(kid)?;

        if !snapshot.within_stale_ceiling(now, self.max_stale) {
            tracing::error!(
                target: "auth.cache",
                max_stale_secs = self.max_stale.as_secs(),
                "Cached key exceeded staleness ceiling, refusing to serve"
            );
            return Some(Err(KeyLookupError::TooStale));
        }

        tracing::warn!(target: "auth.cache", "JWKS refresh failed, serving stale cached key");
        metrics::record_stale_key_served();
        Some(Ok(key))
    }
}

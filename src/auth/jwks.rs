//! JWKS fetching and caching for bearer-token signature keys.
//!
//! The key set is fetched lazily on the first request needing it and cached
//! for one hour. The cold-cache fetch is single-flight: concurrent requests
//! arriving before the first fetch completes await the same fetch instead
//! of each hitting the provider. Warm reads take no lock.
//!
//! An unknown `kid` triggers exactly one forced refresh before failing, so
//! key rotation is picked up without a re-fetch storm for keys that truly
//! do not exist.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use tokio::sync::Mutex;
use tracing::debug;

use super::AuthError;

/// Cached JWKS entry.
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// JWKS cache, one entry per JWKS URI.
pub struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    /// Serializes cold-cache fetches (single-flight).
    fetch_lock: Mutex<()>,
    http: reqwest::Client,
    ttl: Duration,
}

impl JwksCache {
    /// Create with the default 1-hour TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }

    /// Create with an explicit TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            fetch_lock: Mutex::new(()),
            http: reqwest::Client::builder()
                .https_only(true)
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            ttl,
        }
    }

    /// Return the cached key set for `jwks_uri`, fetching if absent/stale.
    ///
    /// With `force_refresh` the cache is bypassed regardless of TTL (used
    /// once per unknown `kid`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::JwksFetch`] on network or decode failure.
    pub async fn get_or_fetch(
        &self,
        jwks_uri: &str,
        force_refresh: bool,
    ) -> Result<JwkSet, AuthError> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(jwks_uri) {
                if !cached.is_stale() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        // Cold or forced path: one fetch at a time. Re-check under the lock
        // so requests that queued behind the winner reuse its result.
        let _guard = self.fetch_lock.lock().await;
        if !force_refresh {
            if let Some(cached) = self.inner.get(jwks_uri) {
                if !cached.is_stale() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(uri = %jwks_uri, "Fetching JWKS");
        let jwks: JwkSet = self.http.get(jwks_uri).send().await?.json().await?;

        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: jwks.clone(),
                fetched_at: Instant::now(),
                ttl: self.ttl,
            },
        );

        Ok(jwks)
    }

    /// Find a decoding key by `kid`, refreshing once if it is not cached.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownKeyId`] when the key is absent even
    /// after a refresh, or [`AuthError::JwksFetch`] on fetch failure.
    pub async fn find_decoding_key(
        &self,
        jwks_uri: &str,
        kid: &str,
    ) -> Result<DecodingKey, AuthError> {
        let jwks = self.get_or_fetch(jwks_uri, false).await?;
        if let Some(key) = find_key_in_jwks(&jwks, kid) {
            return Ok(key);
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let jwks = self.get_or_fetch(jwks_uri, true).await?;
        find_key_in_jwks(&jwks, kid).ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }

    /// Seed the cache with a known key set (tests, pinned deployments).
    pub fn seed(&self, jwks_uri: &str, keys: JwkSet) {
        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys,
                fetched_at: Instant::now(),
                ttl: self.ttl,
            },
        );
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a JWK by `kid` and convert it to a [`DecodingKey`].
fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        let jwk_kid = jwk.common.key_id.as_deref().unwrap_or("");
        if jwk_kid != kid {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}

/// Derive the default JWKS URI from an issuer/authority URL using OIDC
/// discovery conventions.
#[must_use]
pub fn default_jwks_uri(authority: &str) -> String {
    let base = authority.trim_end_matches('/');
    format!("{base}/.well-known/jwks.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_jwks_uri_appends_well_known() {
        assert_eq!(
            default_jwks_uri("https://login.microsoftonline.com/common/v2.0"),
            "https://login.microsoftonline.com/common/v2.0/.well-known/jwks.json"
        );
    }

    #[test]
    fn default_jwks_uri_handles_trailing_slash() {
        assert_eq!(
            default_jwks_uri("https://login.microsoftonline.com/common/v2.0/"),
            "https://login.microsoftonline.com/common/v2.0/.well-known/jwks.json"
        );
    }

    #[tokio::test]
    async fn seeded_cache_serves_without_network() {
        let cache = JwksCache::new();
        let jwks: JwkSet = serde_json::from_value(json!({ "keys": [] })).unwrap();
        cache.seed("https://idp.example/jwks", jwks);

        let got = cache
            .get_or_fetch("https://idp.example/jwks", false)
            .await
            .unwrap();
        assert!(got.keys.is_empty());
    }

    #[tokio::test]
    async fn unknown_kid_in_seeded_set_is_reported() {
        let cache = JwksCache::new();
        let jwks: JwkSet = serde_json::from_value(json!({ "keys": [] })).unwrap();
        // Seeding covers both the cached read and the forced refresh path
        // would hit the network; use an https URI that fails fast instead.
        cache.seed("https://idp.invalid/jwks", jwks);

        let err = cache
            .find_decoding_key("https://idp.invalid/jwks", "kid-1")
            .await
            .unwrap_err();
        // Refresh against an unreachable host surfaces as a fetch error.
        assert!(matches!(err, AuthError::JwksFetch(_)));
    }
}

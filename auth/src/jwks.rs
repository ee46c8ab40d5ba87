//! JWKS fetching and caching for the optional JWT auth method.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("failed to fetch JWKS from {uri}: {detail}")]
    Fetch { uri: String, detail: String },
    #[error("no key found for kid {0}")]
    KeyNotFound(String),
}

/// Decoding keys are derived from the fetched set once per `kid` and kept
/// in a small LRU so a rotating IDP with several active keys doesn't pay
/// the `DecodingKey::from_jwk` cost on every request.
const DECODING_KEY_CACHE_SIZE: usize = 16;

struct Cached {
    set: JwkSet,
    fetched_at: Instant,
}

/// Caches the JSON Web Key Set fetched from a JWKS endpoint, refreshing it
/// after `ttl` has elapsed since the last successful fetch.
pub struct JwksCache {
    uri: String,
    ttl: Duration,
    http: reqwest::Client,
    cached: Mutex<Option<Cached>>,
    decoding_keys: Mutex<LruCache<String, Arc<jsonwebtoken::DecodingKey>>>,
}

impl JwksCache {
    pub fn new(uri: String, ttl: Duration) -> Self {
        Self {
            uri,
            ttl,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
            decoding_keys: Mutex::new(LruCache::new(
                NonZeroUsize::new(DECODING_KEY_CACHE_SIZE).expect("cache size is nonzero"),
            )),
        }
    }

    /// Returns the decoding key for `kid`, refreshing the cached set first
    /// if it is stale or has never been populated.
    pub async fn key_for(self: &Arc<Self>, kid: &str) -> Result<Arc<jsonwebtoken::DecodingKey>, JwksError> {
        if let Some(key) = self.decoding_keys.lock().get(kid) {
            return Ok(key.clone());
        }

        if self.needs_refresh() {
            self.refresh().await?;
        }

        let key = {
            let guard = self.cached.lock();
            let set = &guard.as_ref().expect("refreshed above").set;
            let jwk = set
                .find(kid)
                .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))?;
            let key = jsonwebtoken::DecodingKey::from_jwk(jwk)
                .map_err(|e| JwksError::Fetch { uri: self.uri.clone(), detail: e.to_string() })?;
            Arc::new(key)
        };
        self.decoding_keys.lock().put(kid.to_string(), key.clone());
        Ok(key)
    }

    fn needs_refresh(&self) -> bool {
        match self.cached.lock().as_ref() {
            None => true,
            Some(cached) => cached.fetched_at.elapsed() > self.ttl,
        }
    }

    async fn refresh(&self) -> Result<(), JwksError> {
        let response = self
            .http
            .get(&self.uri)
            .send()
            .await
            .map_err(|e| JwksError::Fetch { uri: self.uri.clone(), detail: e.to_string() })?;
        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::Fetch { uri: self.uri.clone(), detail: e.to_string() })?;
        *self.cached.lock() = Some(Cached {
            set,
            fetched_at: Instant::now(),
        });
        self.decoding_keys.lock().clear();
        Ok(())
    }
}

//! Content-addressed cache keys and typed access over a [`CacheStore`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::WorkerError;
use crate::settings::EvaluationSettings;
use crate::store::CacheStore;

pub const POSITION_PREFIX: &str = "position:";
pub const GAME_PREFIX: &str = "game:";

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Key for one position under one set of engine settings.
pub fn position_key(settings: &EvaluationSettings, fen: &str) -> Result<String, WorkerError> {
    let canonical = serde_json::to_vec(&(settings, fen))?;
    Ok(format!("{POSITION_PREFIX}{}", content_hash(&canonical)))
}

/// Key for a stored game payload, derived from its serialized form.
pub fn game_key(payload_json: &str) -> String {
    format!("{GAME_PREFIX}{}", content_hash(payload_json.as_bytes()))
}

/// JSON view over a raw store.
pub struct Cache<S> {
    store: S,
}

impl<S: CacheStore> Cache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read and decode. An entry that fails to decode counts as a miss and is
    /// evicted, so the recomputed value can take its place.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkerError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Evicting undecodable cache entry");
                if let Err(e) = self.store.remove(key).await {
                    warn!(key, error = %e, "Failed to evict cache entry");
                }
                Ok(None)
            }
        }
    }

    /// Store a value, logging instead of failing when the store rejects it.
    /// Returns whether the write went through.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, WorkerError> {
        let raw = serde_json::to_string(value)?;
        Ok(self.put_raw(key, &raw).await)
    }

    pub async fn put_raw(&self, key: &str, raw: &str) -> bool {
        match self.store.set(key, raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Cache write failed, result is not durable");
                false
            }
        }
    }
}

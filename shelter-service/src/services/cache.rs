use serde::{de::DeserializeOwned, Serialize};
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use crate::services::CacheBackend;

/// Response cache for one owner (a route group or service).
///
/// Keys are `"{owner}:{sha256(params)}"`, so they are stable across processes.
/// Backend failures never reach callers: reads turn into misses and writes are
/// logged and dropped.
pub struct ResponseCache {
    owner: String,
    backend: Arc<dyn CacheBackend>,
    ttl_seconds: u64,
    registered: Mutex<HashSet<String>>,
}

impl ResponseCache {
    pub fn new(owner: impl Into<String>, backend: Arc<dyn CacheBackend>, ttl_seconds: u64) -> Self {
        Self {
            owner: owner.into(),
            backend,
            ttl_seconds,
            registered: Mutex::new(HashSet::new()),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn key_for<P: Serialize + ?Sized>(&self, params: &P) -> Result<String, AppError> {
        Ok(format!("{}:{}", self.owner, digest(params)?))
    }

    /// Key for a listing-style response, remembered for [`invalidate_all_registered`].
    ///
    /// [`invalidate_all_registered`]: Self::invalidate_all_registered
    pub fn key_for_all<P: Serialize + ?Sized>(
        &self,
        prefix: &str,
        params: &P,
    ) -> Result<String, AppError> {
        let key = format!("{}:all_{}:{}", self.owner, prefix, digest(params)?);
        if let Ok(mut registered) = self.registered.lock() {
            registered.insert(key.clone());
        }
        Ok(key)
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.registered
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cached value could not be decoded");
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.ttl_seconds).await
    }

    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Value could not be serialized for caching");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, &raw, ttl_seconds).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Cache delete failed");
        }
    }

    /// Delete every key handed out by `key_for_all`.
    ///
    /// Keys whose delete fails stay registered for the next call. Returns the
    /// number of keys deleted.
    pub async fn invalidate_all_registered(&self) -> usize {
        let keys: Vec<String> = match self.registered.lock() {
            Ok(mut registered) => registered.drain().collect(),
            Err(_) => return 0,
        };

        let mut failed = Vec::new();
        for key in keys.iter() {
            if let Err(e) = self.backend.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Cache delete failed, keeping key registered");
                failed.push(key.clone());
            }
        }

        let deleted = keys.len() - failed.len();
        if !failed.is_empty() {
            if let Ok(mut registered) = self.registered.lock() {
                registered.extend(failed);
            }
        }

        tracing::debug!(owner = %self.owner, deleted, "Invalidated registered cache keys");
        deleted
    }
}

fn digest<P: Serialize + ?Sized>(params: &P) -> Result<String, AppError> {
    let bytes = serde_json::to_vec(params).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Cache key parameters not serializable: {}", e))
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

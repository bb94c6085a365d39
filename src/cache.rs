//! Memoization of list data across views.
//!
//! A `CacheService` is built once at startup and handed to whatever needs it;
//! nothing reaches for a global. Values are stored as JSON so the same
//! service can back both in-memory and on-disk implementations.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

pub const PENDING_BUFFERS_KEY: &str = "training.pending_buffers";
pub const PENDING_COMMITS_KEY: &str = "training.pending_commits";

pub trait CacheService: Send + Sync {
    fn get_raw(&self, key: &str) -> Option<Value>;
    fn set_raw(&self, key: &str, value: Value);
    fn invalidate(&self, key: &str);
}

/// Typed access on top of any [`CacheService`]. Entries that no longer
/// decode into `T` read as a miss.
pub trait CacheExt {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T>;
    fn set<T: Serialize>(&self, key: &str, value: &T);
}

impl<C: CacheService + ?Sized> CacheExt for C {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_value(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("cache entry {} no longer decodes: {}", key, e);
                None
            }
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.set_raw(key, v),
            Err(e) => log::warn!("could not cache {}: {}", key, e),
        }
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheService for MemoryCache {
    fn get_raw(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: Value) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value);
    }

    fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
    }
}

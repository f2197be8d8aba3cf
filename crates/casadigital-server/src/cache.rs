//! In-process response cache for marketplace lookups.
//!
//! Values are stored as JSON with a fixed time-to-live. Serialization
//! problems are logged and treated as a miss; the cache never fails a
//! request.

use std::time::Duration;

use moka::sync::Cache;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, Value>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(ttl_secs: u64, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { entries }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.entries.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache: dropping undecodable entry");
                self.entries.invalidate(key);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.entries.insert(key.to_string(), v),
            Err(e) => tracing::warn!(key, error = %e, "cache: value not serializable"),
        }
    }

    /// Drops every entry. Returns how many were cached beforehand.
    pub fn clear(&self) -> u64 {
        self.entries.run_pending_tasks();
        let count = self.entries.entry_count();
        self.entries.invalidate_all();
        count
    }
}

/// Joins trimmed key parts with `:`. Each part is form-encoded so a `:`
/// inside a part cannot shift the boundaries. Case is kept; callers
/// normalize free text themselves.
pub fn cache_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| url::form_urlencoded::byte_serialize(p.trim().as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

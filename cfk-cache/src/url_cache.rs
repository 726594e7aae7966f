//! In-memory cache of signed/proxy URLs handed out by the link resolver.
//!
//! Keyed by the tuple that makes two requests for "the same link"
//! interchangeable; invalidated by the cache bus on any mutation touching
//! the owning storage config.

use crate::lru::LruCache;
use cfk_core::LinkOutcome;
use chrono::{DateTime, Utc};
use std::num::NonZeroUsize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlCacheKey {
    pub storage_config_id: String,
    pub sub_path: String,
    pub force_download: bool,
    pub user_kind: Option<String>,
    pub user_ref: Option<String>,
}

struct Entry {
    outcome: LinkOutcome,
    expires_at: Option<DateTime<Utc>>,
}

pub struct UrlCache {
    inner: Mutex<LruCache<UrlCacheKey, Entry>>,
}

impl UrlCache {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())) }
    }

    pub fn get(&self, key: &UrlCacheKey) -> Option<LinkOutcome> {
        let mut cache = self.inner.lock().unwrap();
        match cache.get(key) {
            Some(entry) if entry.expires_at.map(|e| Utc::now() < e).unwrap_or(true) => Some(entry.outcome.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: UrlCacheKey, outcome: LinkOutcome) {
        let expires_at = outcome.expires_in_secs.map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));
        self.inner.lock().unwrap().put(key, Entry { outcome, expires_at });
    }

    /// Drop every entry for a storage config; used on cache-bus invalidation
    /// since URLs are not indexed by path within the map.
    pub fn invalidate_storage_config(&self, storage_config_id: &str) {
        let mut cache = self.inner.lock().unwrap();
        cache.retain(|k| k.storage_config_id != storage_config_id);
    }
}

impl Default for UrlCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

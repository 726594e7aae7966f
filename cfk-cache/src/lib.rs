//! Persistence and caching layer for Czech File Knife.
//!
//! Backs the three pieces of state the gateway keeps outside of the
//! administrator-facing mount/storage-config tables: directory/entry
//! metadata (for list/stat short-circuiting), resumable upload sessions,
//! and the signed-URL cache. All three are sled-backed so a single
//! embedded database file covers the gateway's persisted state.

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<CacheError> for cfk_core::CfkError {
    fn from(e: CacheError) -> Self {
        cfk_core::CfkError::Repository(e.to_string())
    }
}

pub mod cache_bus;
pub mod metadata_cache;
pub mod sled_backend;
pub mod upload_sessions;
pub mod url_cache;

/// A small hand-rolled LRU, shared by the in-memory layers in this crate.
/// Backed by a `Vec` rather than an intrusive linked list since the cache
/// sizes here (thousands of entries) don't warrant the complexity.
pub(crate) mod lru {
    use std::collections::HashMap;
    use std::hash::Hash;
    use std::num::NonZeroUsize;

    pub struct LruCache<K, V> {
        map: HashMap<K, V>,
        order: Vec<K>,
        capacity: usize,
    }

    impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
        pub fn new(capacity: NonZeroUsize) -> Self {
            Self { map: HashMap::new(), order: Vec::new(), capacity: capacity.get() }
        }

        pub fn get(&mut self, key: &K) -> Option<&V> {
            if self.map.contains_key(key) {
                self.order.retain(|k| k != key);
                self.order.push(key.clone());
                self.map.get(key)
            } else {
                None
            }
        }

        pub fn put(&mut self, key: K, value: V) {
            if self.map.contains_key(&key) {
                self.order.retain(|k| k != &key);
            } else if self.map.len() >= self.capacity {
                if !self.order.is_empty() {
                    let oldest = self.order.remove(0);
                    self.map.remove(&oldest);
                }
            }
            self.map.insert(key.clone(), value);
            self.order.push(key);
        }

        pub fn pop(&mut self, key: &K) -> Option<V> {
            self.order.retain(|k| k != key);
            self.map.remove(key)
        }

        pub fn clear(&mut self) {
            self.map.clear();
            self.order.clear();
        }

        pub fn len(&self) -> usize {
            self.map.len()
        }

        /// Drop every entry for which `keep` returns false.
        pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
            self.order.retain(|k| keep(k));
            self.map.retain(|k, _| keep(k));
        }
    }
}

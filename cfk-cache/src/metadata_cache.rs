//! Directory/entry metadata caching.
//!
//! Lets `list`/`stat` short-circuit a round trip to the provider within a
//! mount's configured `cache_ttl_secs`. Every driver answer may be stored
//! here by the facade; a `refresh=true` request bypasses it entirely.

use cfk_core::{DirectoryListing, FileEntry, VirtualPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::lru::LruCache;
use crate::{sled_backend::SledBackend, CacheError, CacheResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    entry: FileEntry,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedDirectory {
    children: Vec<FileEntry>,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CachedDirectory {
    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct MetadataCacheConfig {
    pub db_path: PathBuf,
    pub default_ttl_secs: i64,
    pub memory_capacity: usize,
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        let cache_dir = directories::ProjectDirs::from("com", "cfk", "czech-file-knife")
            .map(|d| d.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/tmp/cfk-cache"));

        Self { db_path: cache_dir.join("metadata.db"), default_ttl_secs: 60, memory_capacity: 10_000 }
    }
}

fn entry_key(mount_id: &str, path: &VirtualPath) -> Vec<u8> {
    format!("entry:{mount_id}:{}", path.to_path_string()).into_bytes()
}

fn dir_key(mount_id: &str, path: &VirtualPath) -> Vec<u8> {
    format!("dir:{mount_id}:{}", path.to_path_string()).into_bytes()
}

pub struct MetadataCache {
    db: SledBackend,
    ttl_secs: i64,
    memory: Arc<RwLock<LruCache<Vec<u8>, CachedEntry>>>,
}

impl MetadataCache {
    pub fn open(config: MetadataCacheConfig) -> CacheResult<Self> {
        let db = SledBackend::open(&config.db_path)?;
        Ok(Self {
            db,
            ttl_secs: config.default_ttl_secs,
            memory: Arc::new(RwLock::new(LruCache::new(NonZeroUsize::new(config.memory_capacity.max(1)).unwrap()))),
        })
    }

    pub fn open_default() -> CacheResult<Self> {
        Self::open(MetadataCacheConfig::default())
    }

    pub async fn put_entry(&self, mount_id: &str, entry: &FileEntry) -> CacheResult<()> {
        self.put_entry_with_ttl(mount_id, entry, self.ttl_secs).await
    }

    pub async fn put_entry_with_ttl(&self, mount_id: &str, entry: &FileEntry, ttl_secs: i64) -> CacheResult<()> {
        let key = entry_key(mount_id, &entry.fs_path);
        let now = Utc::now();
        let cached = CachedEntry { entry: entry.clone(), cached_at: now, expires_at: now + chrono::Duration::seconds(ttl_secs) };
        let bytes = serde_json::to_vec(&cached).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.db.insert(&key, &bytes)?;
        self.memory.write().await.put(key, cached);
        Ok(())
    }

    pub async fn get_entry(&self, mount_id: &str, path: &VirtualPath) -> CacheResult<Option<FileEntry>> {
        let key = entry_key(mount_id, path);

        if let Some(cached) = self.memory.write().await.get(&key) {
            if !cached.is_expired() {
                return Ok(Some(cached.entry.clone()));
            }
        }

        match self.db.get(&key)? {
            Some(bytes) => {
                let cached: CachedEntry = serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization(e.to_string()))?;
                if cached.is_expired() {
                    self.db.remove(&key)?;
                    return Ok(None);
                }
                let entry = cached.entry.clone();
                self.memory.write().await.put(key, cached);
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    pub async fn put_directory(&self, mount_id: &str, path: &VirtualPath, listing: &DirectoryListing) -> CacheResult<()> {
        let now = Utc::now();
        let cached = CachedDirectory { children: listing.entries.clone(), cached_at: now, expires_at: now + chrono::Duration::seconds(self.ttl_secs) };
        let bytes = serde_json::to_vec(&cached).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.db.insert(&dir_key(mount_id, path), &bytes)?;

        for entry in &listing.entries {
            self.put_entry(mount_id, entry).await?;
        }
        Ok(())
    }

    pub async fn get_directory(&self, mount_id: &str, path: &VirtualPath) -> CacheResult<Option<DirectoryListing>> {
        match self.db.get(&dir_key(mount_id, path))? {
            Some(bytes) => {
                let cached: CachedDirectory = serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization(e.to_string()))?;
                if cached.is_expired() {
                    self.db.remove(&dir_key(mount_id, path))?;
                    return Ok(None);
                }
                Ok(Some(DirectoryListing::new(path.clone(), cached.children)))
            }
            None => Ok(None),
        }
    }

    pub async fn invalidate(&self, mount_id: &str, path: &VirtualPath) -> CacheResult<()> {
        self.db.remove(&entry_key(mount_id, path))?;
        self.db.remove(&dir_key(mount_id, path))?;
        self.memory.write().await.pop(&entry_key(mount_id, path));
        Ok(())
    }

    /// Invalidate every cached entry/listing whose path falls under the
    /// given prefix, for a mutation that affects a subtree (rename, batch
    /// delete of a directory).
    pub async fn invalidate_subtree(&self, mount_id: &str, path: &VirtualPath) -> CacheResult<()> {
        let entry_prefix = format!("entry:{mount_id}:{}", path.to_path_string());
        let dir_prefix = format!("dir:{mount_id}:{}", path.to_path_string());
        for entry in self.db.scan_prefix(entry_prefix.as_bytes()) {
            let (key, _) = entry?;
            self.db.remove(&key)?;
        }
        for entry in self.db.scan_prefix(dir_prefix.as_bytes()) {
            let (key, _) = entry?;
            self.db.remove(&key)?;
        }
        self.memory.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dir: &tempfile::TempDir) -> MetadataCacheConfig {
        MetadataCacheConfig { db_path: dir.path().join("metadata.db"), default_ttl_secs: 60, memory_capacity: 100 }
    }

    #[tokio::test]
    async fn put_and_get_entry_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::open(cfg(&dir)).unwrap();
        let path = VirtualPath::new("/docs/readme.txt");
        let entry = FileEntry::file(path.clone(), 42, "mount1", "local");

        cache.put_entry("mount1", &entry).await.unwrap();
        let fetched = cache.get_entry("mount1", &path).await.unwrap().unwrap();
        assert_eq!(fetched.size, 42);
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::open(cfg(&dir)).unwrap();
        let path = VirtualPath::new("/docs/readme.txt");
        let entry = FileEntry::file(path.clone(), 42, "mount1", "local");

        cache.put_entry_with_ttl("mount1", &entry, -1).await.unwrap();
        assert!(cache.get_entry("mount1", &path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::open(cfg(&dir)).unwrap();
        let path = VirtualPath::new("/docs/readme.txt");
        let entry = FileEntry::file(path.clone(), 42, "mount1", "local");

        cache.put_entry("mount1", &entry).await.unwrap();
        cache.invalidate("mount1", &path).await.unwrap();
        assert!(cache.get_entry("mount1", &path).await.unwrap().is_none());
    }
}

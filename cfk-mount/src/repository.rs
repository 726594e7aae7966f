//! Mount/storage-config persistence.
//!
//! Mounts, storage configs, and API keys are named out of scope for the
//! core's responsibilities, but the gateway still needs *some* place to
//! keep them to be runnable standalone. A small `sled`-backed default
//! implementation lives here behind a trait so a real deployment can swap
//! in its own database-backed repository without touching the facade.

use async_trait::async_trait;
use cfk_core::mount::{Mount, StorageConfig};
use cfk_core::{CfkError, CfkResult};
use cfk_cache::sled_backend::SledBackend;
use std::path::Path;

#[async_trait]
pub trait MountRepository: Send + Sync {
    async fn list_active(&self) -> CfkResult<Vec<Mount>>;
    async fn get(&self, id: &str) -> CfkResult<Option<Mount>>;
    async fn put(&self, mount: Mount) -> CfkResult<()>;
    async fn remove(&self, id: &str) -> CfkResult<()>;
}

#[async_trait]
pub trait StorageConfigRepository: Send + Sync {
    async fn get(&self, id: &str) -> CfkResult<Option<StorageConfig>>;
    async fn put(&self, config: StorageConfig) -> CfkResult<()>;
    async fn remove(&self, id: &str) -> CfkResult<()>;
}

fn mount_key(id: &str) -> Vec<u8> {
    format!("mount:{id}").into_bytes()
}

fn config_key(id: &str) -> Vec<u8> {
    format!("storage_config:{id}").into_bytes()
}

pub struct SledRepository {
    db: SledBackend,
}

impl SledRepository {
    pub fn open(path: impl AsRef<Path>) -> CfkResult<Self> {
        let db = SledBackend::open(path).map_err(|e| CfkError::Repository(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl MountRepository for SledRepository {
    async fn list_active(&self) -> CfkResult<Vec<Mount>> {
        let mut mounts = Vec::new();
        for entry in self.db.scan_prefix(b"mount:") {
            let (_, value) = entry.map_err(|e| CfkError::Repository(e.to_string()))?;
            let mount: Mount = serde_json::from_slice(&value).map_err(|e| CfkError::Repository(e.to_string()))?;
            if mount.active {
                mounts.push(mount);
            }
        }
        Ok(mounts)
    }

    async fn get(&self, id: &str) -> CfkResult<Option<Mount>> {
        match self.db.get(&mount_key(id)).map_err(|e| CfkError::Repository(e.to_string()))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| CfkError::Repository(e.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn put(&self, mount: Mount) -> CfkResult<()> {
        let bytes = serde_json::to_vec(&mount).map_err(|e| CfkError::Repository(e.to_string()))?;
        self.db.insert(&mount_key(&mount.id), &bytes).map_err(|e| CfkError::Repository(e.to_string()))
    }

    async fn remove(&self, id: &str) -> CfkResult<()> {
        self.db.remove(&mount_key(id)).map_err(|e| CfkError::Repository(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl StorageConfigRepository for SledRepository {
    async fn get(&self, id: &str) -> CfkResult<Option<StorageConfig>> {
        match self.db.get(&config_key(id)).map_err(|e| CfkError::Repository(e.to_string()))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| CfkError::Repository(e.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn put(&self, config: StorageConfig) -> CfkResult<()> {
        let bytes = serde_json::to_vec(&config).map_err(|e| CfkError::Repository(e.to_string()))?;
        self.db.insert(&config_key(&config.id), &bytes).map_err(|e| CfkError::Repository(e.to_string()))
    }

    async fn remove(&self, id: &str) -> CfkResult<()> {
        self.db.remove(&config_key(id)).map_err(|e| CfkError::Repository(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfk_core::mount::WebdavPolicy;
    use cfk_core::VirtualPath;

    fn sample_mount(id: &str, path: &str) -> Mount {
        Mount {
            id: id.into(),
            mount_path: VirtualPath::new(path),
            storage_config_id: "cfg1".into(),
            web_proxy: false,
            webdav_policy: WebdavPolicy::NativeProxy,
            cache_ttl_secs: 60,
            active: true,
            order: 0,
        }
    }

    #[tokio::test]
    async fn put_and_list_active_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledRepository::open(dir.path()).unwrap();
        repo.put(sample_mount("m1", "/s3")).await.unwrap();

        let mut inactive = sample_mount("m2", "/wd");
        inactive.active = false;
        repo.put(inactive).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "m1");
    }

    #[tokio::test]
    async fn storage_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledRepository::open(dir.path()).unwrap();
        let config = StorageConfig {
            id: "cfg1".into(),
            driver_type: "s3".into(),
            url_proxy: None,
            signature_expires_in_secs: 3600,
            chunk_size_mb: 8,
            credentials: b"{}".to_vec(),
        };
        StorageConfigRepository::put(&repo, config).await.unwrap();
        let fetched = StorageConfigRepository::get(&repo, "cfg1").await.unwrap().unwrap();
        assert_eq!(fetched.driver_type, "s3");
    }
}

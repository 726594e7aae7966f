//! Mount resolution and driver instantiation.
//!
//! `MountManager` owns the set of active mounts and a small cache of
//! already-constructed drivers keyed by `storage_config_id`. Resolution is
//! longest-prefix: of every mount whose `mount_path` is a prefix of the
//! request path, the deepest one wins. A request path that is itself only
//! a strict prefix of some deeper mount's path has no driver of its own --
//! it resolves to a synthesized virtual directory listing the next path
//! segment of each such mount instead of a `NotFound`.

use cfk_core::mount::Mount;
use cfk_core::{CfkError, CfkResult, StorageDriver, VirtualPath};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::credentials::CredentialCipher;
use crate::driver_factory::build_driver;
use crate::repository::{MountRepository, StorageConfigRepository};

/// Outcome of resolving a request path against the mount table.
pub enum Resolution {
    /// `mount` owns this path; `sub_path` is the portion below its
    /// `mount_path` to hand the driver.
    Driver { mount: Mount, driver: Arc<dyn StorageDriver>, sub_path: VirtualPath },
    /// No mount owns this path directly, but one or more mounts are
    /// nested below it. `children` holds each such mount's next path
    /// segment below `path`.
    VirtualDirectory { children: Vec<String> },
}

/// Per-storage-config driver cache. A `tokio::sync::Mutex` guards only the
/// construction itself -- once built, the `Arc<dyn StorageDriver>` is
/// cloned out and used lock-free.
struct DriverSlot {
    lock: Mutex<Option<Arc<dyn StorageDriver>>>,
}

pub struct MountManager {
    mounts: Arc<dyn MountRepository>,
    storage_configs: Arc<dyn StorageConfigRepository>,
    cipher: Arc<dyn CredentialCipher>,
    drivers: Mutex<HashMap<String, Arc<DriverSlot>>>,
}

impl MountManager {
    pub fn new(
        mounts: Arc<dyn MountRepository>,
        storage_configs: Arc<dyn StorageConfigRepository>,
        cipher: Arc<dyn CredentialCipher>,
    ) -> Self {
        Self { mounts, storage_configs, cipher, drivers: Mutex::new(HashMap::new()) }
    }

    /// Evict a cached driver, forcing the next resolution to rebuild it.
    /// Called when an administrator edits a `StorageConfig` in place.
    pub async fn invalidate_driver(&self, storage_config_id: &str) {
        self.drivers.lock().await.remove(storage_config_id);
    }

    /// Resolve a bare `storage_config_id` to its driver, independent of
    /// any mount. Used by the multipart session manager, whose rows carry
    /// the storage config id directly rather than a request path.
    pub async fn driver_for_storage_config(&self, storage_config_id: &str) -> CfkResult<Arc<dyn StorageDriver>> {
        self.driver_for(storage_config_id).await
    }

    async fn driver_for(&self, storage_config_id: &str) -> CfkResult<Arc<dyn StorageDriver>> {
        let slot = {
            let mut drivers = self.drivers.lock().await;
            Arc::clone(drivers.entry(storage_config_id.to_string()).or_insert_with(|| {
                Arc::new(DriverSlot { lock: Mutex::new(None) })
            }))
        };

        let mut guard = slot.lock.await;
        if let Some(driver) = guard.as_ref() {
            return Ok(Arc::clone(driver));
        }

        let config = self
            .storage_configs
            .get(storage_config_id)
            .await?
            .ok_or_else(|| CfkError::driver("config", format!("unknown storage config: {storage_config_id}")))?;
        let driver = build_driver(&config, self.cipher.as_ref()).await?;
        *guard = Some(Arc::clone(&driver));
        Ok(driver)
    }

    /// Resolve a request path to either a driver + sub-path, or a
    /// synthesized virtual directory of deeper mount points.
    pub async fn resolve(&self, path: &VirtualPath) -> CfkResult<Resolution> {
        let mounts = self.mounts.list_active().await?;

        let owner = mounts
            .iter()
            .filter(|m| m.is_match(path))
            .max_by_key(|m| m.mount_path.depth());

        if let Some(mount) = owner {
            let driver = self.driver_for(&mount.storage_config_id).await?;
            let sub_path = path.strip_prefix(&mount.mount_path);
            return Ok(Resolution::Driver { mount: mount.clone(), driver, sub_path });
        }

        let mut children = Vec::new();
        for mount in &mounts {
            if mount.mount_path.is_sub_path_of(path) && mount.mount_path != *path {
                let next = mount.mount_path.segments()[path.depth()].clone();
                if !children.contains(&next) {
                    children.push(next);
                }
            }
        }

        if children.is_empty() {
            Err(CfkError::NotFound(path.to_path_string()))
        } else {
            Ok(Resolution::VirtualDirectory { children })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::NoopCipher;
    use crate::repository::SledRepository;
    use cfk_core::mount::{StorageConfig, WebdavPolicy};

    async fn sample_manager(dir: &std::path::Path) -> MountManager {
        let repo = Arc::new(SledRepository::open(dir).unwrap());

        MountRepository::put(
            repo.as_ref(),
            Mount {
                id: "m-s3".into(),
                mount_path: VirtualPath::new("/s3"),
                storage_config_id: "cfg-s3".into(),
                web_proxy: false,
                webdav_policy: WebdavPolicy::NativeProxy,
                cache_ttl_secs: 60,
                active: true,
                order: 0,
            },
        )
        .await
        .unwrap();

        MountRepository::put(
            repo.as_ref(),
            Mount {
                id: "m-s3-nested".into(),
                mount_path: VirtualPath::new("/s3/backups/nightly"),
                storage_config_id: "cfg-local".into(),
                web_proxy: false,
                webdav_policy: WebdavPolicy::NativeProxy,
                cache_ttl_secs: 60,
                active: true,
                order: 1,
            },
        )
        .await
        .unwrap();

        StorageConfigRepository::put(
            repo.as_ref(),
            StorageConfig {
                id: "cfg-s3".into(),
                driver_type: "local".into(),
                url_proxy: None,
                signature_expires_in_secs: 3600,
                chunk_size_mb: 8,
                credentials: serde_json::to_vec(&serde_json::json!({ "root": dir })).unwrap(),
            },
        )
        .await
        .unwrap();

        StorageConfigRepository::put(
            repo.as_ref(),
            StorageConfig {
                id: "cfg-local".into(),
                driver_type: "local".into(),
                url_proxy: None,
                signature_expires_in_secs: 3600,
                chunk_size_mb: 8,
                credentials: serde_json::to_vec(&serde_json::json!({ "root": dir })).unwrap(),
            },
        )
        .await
        .unwrap();

        MountManager::new(repo.clone(), repo, Arc::new(NoopCipher))
    }

    #[tokio::test]
    async fn resolves_longest_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let manager = sample_manager(dir.path()).await;

        let resolved = manager.resolve(&VirtualPath::new("/s3/backups/nightly/db.sql")).await.unwrap();
        match resolved {
            Resolution::Driver { mount, sub_path, .. } => {
                assert_eq!(mount.id, "m-s3-nested");
                assert_eq!(sub_path.to_path_string(), "/db.sql");
            }
            Resolution::VirtualDirectory { .. } => panic!("expected a driver match"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_shallower_mount() {
        let dir = tempfile::tempdir().unwrap();
        let manager = sample_manager(dir.path()).await;

        let resolved = manager.resolve(&VirtualPath::new("/s3/other/file.txt")).await.unwrap();
        match resolved {
            Resolution::Driver { mount, sub_path, .. } => {
                assert_eq!(mount.id, "m-s3");
                assert_eq!(sub_path.to_path_string(), "/other/file.txt");
            }
            Resolution::VirtualDirectory { .. } => panic!("expected a driver match"),
        }
    }

    #[tokio::test]
    async fn synthesizes_virtual_directory_above_nested_mount() {
        let dir = tempfile::tempdir().unwrap();
        let manager = sample_manager(dir.path()).await;

        let resolved = manager.resolve(&VirtualPath::root()).await.unwrap();
        match resolved {
            Resolution::Driver { .. } => panic!("root has no driver of its own here"),
            Resolution::VirtualDirectory { children } => {
                assert_eq!(children, vec!["s3".to_string()]);
            }
        }
    }

    #[tokio::test]
    async fn unmatched_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = sample_manager(dir.path()).await;

        let err = manager.resolve(&VirtualPath::new("/nowhere")).await.unwrap_err();
        assert!(matches!(err, CfkError::NotFound(_)));
    }
}

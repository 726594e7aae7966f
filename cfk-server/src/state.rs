//! Shared application state: the facade plus the process-wide singleton
//! services it and the WebDAV layer both need a handle to.
//!
//! Per the "global singletons are process-wide services with lifecycle
//! owned by server bootstrap" design note, the cache bus and URL cache are
//! constructed once here and threaded through, never reached for as a
//! `static`.

use std::sync::Arc;

use cfk_cache::cache_bus::CacheBus;
use cfk_cache::upload_sessions::UploadSessionStore;
use cfk_cache::url_cache::UrlCache;
use cfk_mount::credentials::NoopCipher;
use cfk_mount::repository::SledRepository;
use cfk_mount::{FileSystem, MountManager};

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub fs: Arc<FileSystem>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub async fn bootstrap(config: GatewayConfig) -> cfk_core::CfkResult<Self> {
        std::fs::create_dir_all(config.db_path.parent().unwrap_or(&config.db_path))
            .map_err(cfk_core::CfkError::Io)?;

        let repo = Arc::new(
            SledRepository::open(&config.db_path).map_err(|e| cfk_core::CfkError::Repository(e.to_string()))?,
        );

        for mount in config.mounts.clone() {
            let mount: cfk_core::Mount = mount.into();
            cfk_mount::repository::MountRepository::put(repo.as_ref(), mount).await?;
        }

        let upload_sessions = Arc::new(
            UploadSessionStore::open(config.db_path.with_extension("sessions"))
                .map_err(|e| cfk_core::CfkError::Repository(e.to_string()))?,
        );
        let cache_bus = Arc::new(CacheBus::new());
        let url_cache = Arc::new(UrlCache::default());

        let mounts = MountManager::new(repo.clone(), repo, Arc::new(NoopCipher));
        let fs = FileSystem::new(mounts, cache_bus, url_cache, upload_sessions);

        Ok(Self { fs: Arc::new(fs), config: Arc::new(config) })
    }
}

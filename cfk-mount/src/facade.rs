//! The `FileSystem` facade: the single entry point the HTTP/JSON API and
//! the WebDAV server both dispatch through.
//!
//! It resolves a request path to a mount and driver, enforces capability
//! gating before ever touching the driver, rewrites driver-relative
//! entries back into the unified namespace, and publishes a cache
//! invalidation event after every successful mutation -- never during,
//! so a subscriber that re-reads mid-mutation always sees a consistent
//! state either fully before or fully after.

use std::sync::Arc;

use cfk_cache::cache_bus::{CacheBus, CacheInvalidation, InvalidationReason};
use cfk_cache::upload_sessions::UploadSessionStore;
use cfk_cache::url_cache::{UrlCache, UrlCacheKey};
use cfk_core::backend::{BatchResult, DriverCapabilityBit, SpaceInfo};
use cfk_core::mount::{Mount, WebdavPolicy};
use cfk_core::session::{ChunkAck, Fingerprint, PartsStatus, UploadSession, UploadSessionInit};
use cfk_core::{
    ByteStream, CfkError, CfkResult, DirectoryListing, DriverContext, FileEntry, LinkOutcome, StorageDriver,
    VirtualPath,
};
use cfk_core::operations::*;

use crate::resolver::{MountManager, Resolution};

fn rebase(mount_path: &VirtualPath, sub_path: &VirtualPath) -> VirtualPath {
    let mut segments = mount_path.segments().to_vec();
    segments.extend(sub_path.segments().iter().cloned());
    VirtualPath::from_segments(segments)
}

fn rebase_entry(mount_path: &VirtualPath, entry: &mut FileEntry) {
    entry.fs_path = rebase(mount_path, &entry.fs_path);
}

pub struct FileSystem {
    mounts: MountManager,
    cache_bus: Arc<CacheBus>,
    url_cache: Arc<UrlCache>,
    upload_sessions: Arc<UploadSessionStore>,
}

impl FileSystem {
    pub fn new(
        mounts: MountManager,
        cache_bus: Arc<CacheBus>,
        url_cache: Arc<UrlCache>,
        upload_sessions: Arc<UploadSessionStore>,
    ) -> Self {
        Self { mounts, cache_bus, url_cache, upload_sessions }
    }

    async fn resolve_driver(&self, path: &VirtualPath) -> CfkResult<(Mount, Arc<dyn StorageDriver>, VirtualPath)> {
        match self.mounts.resolve(path).await? {
            Resolution::Driver { mount, driver, sub_path } => Ok((mount, driver, sub_path)),
            Resolution::VirtualDirectory { .. } => {
                Err(CfkError::Validation(format!("{path} is a virtual directory, not a file")))
            }
        }
    }

    fn require(driver: &dyn StorageDriver, bit: DriverCapabilityBit, op: &str) -> CfkResult<()> {
        if driver.capabilities().requires(bit) {
            Ok(())
        } else {
            Err(CfkError::not_implemented(op))
        }
    }

    fn emit(&self, mount: &Mount, paths: Vec<VirtualPath>, reason: InvalidationReason) {
        self.cache_bus.publish(CacheInvalidation {
            mount_id: mount.id.clone(),
            storage_config_id: mount.storage_config_id.clone(),
            paths,
            reason,
        });
        self.url_cache.invalidate_storage_config(&mount.storage_config_id);
    }

    pub async fn list(
        &self,
        path: &VirtualPath,
        options: &ListOptions,
        ctx: &DriverContext,
    ) -> CfkResult<DirectoryListing> {
        match self.mounts.resolve(path).await? {
            Resolution::Driver { mount, driver, sub_path } => {
                Self::require(driver.as_ref(), DriverCapabilityBit::Reader, "list")?;
                let mut listing = driver.list(&sub_path, options, ctx).await?;
                listing.path = path.clone();
                for entry in &mut listing.entries {
                    rebase_entry(&mount.mount_path, entry);
                }
                Ok(listing)
            }
            Resolution::VirtualDirectory { children } => {
                let entries = children
                    .into_iter()
                    .map(|name| FileEntry::virtual_directory(path.join(&name), "virtual"))
                    .collect();
                Ok(DirectoryListing::new(path.clone(), entries))
            }
        }
    }

    pub async fn stat(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<FileEntry> {
        match self.mounts.resolve(path).await? {
            Resolution::Driver { mount, driver, sub_path } => {
                let mut entry = driver.stat(&sub_path, ctx).await?;
                rebase_entry(&mount.mount_path, &mut entry);
                Ok(entry)
            }
            Resolution::VirtualDirectory { .. } => Ok(FileEntry::virtual_directory(path.clone(), "virtual")),
        }
    }

    pub async fn exists(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<bool> {
        match self.mounts.resolve(path).await {
            Ok(Resolution::Driver { driver, sub_path, .. }) => driver.exists(&sub_path, ctx).await,
            Ok(Resolution::VirtualDirectory { .. }) => Ok(true),
            Err(CfkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn download(&self, path: &VirtualPath, options: &ReadOptions, ctx: &DriverContext) -> CfkResult<ByteStream> {
        let (_mount, driver, sub_path) = self.resolve_driver(path).await?;
        Self::require(driver.as_ref(), DriverCapabilityBit::Reader, "download")?;
        driver.download(&sub_path, options, ctx).await
    }

    pub async fn upload(
        &self,
        path: &VirtualPath,
        data: ByteStream,
        content_length: Option<u64>,
        options: &WriteOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let (mount, driver, sub_path) = self.resolve_driver(path).await?;
        Self::require(driver.as_ref(), DriverCapabilityBit::Writer, "upload")?;
        let mut entry = driver.upload(&sub_path, data, content_length, options, ctx).await?;
        rebase_entry(&mount.mount_path, &mut entry);
        self.emit(&mount, vec![path.clone()], InvalidationReason::Write);
        Ok(entry)
    }

    pub async fn mkdir(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<FileEntry> {
        let (mount, driver, sub_path) = self.resolve_driver(path).await?;
        Self::require(driver.as_ref(), DriverCapabilityBit::Writer, "mkdir")?;
        let mut entry = driver.mkdir(&sub_path, ctx).await?;
        rebase_entry(&mount.mount_path, &mut entry);
        self.emit(&mount, vec![path.clone()], InvalidationReason::Mkdir);
        Ok(entry)
    }

    pub async fn remove(&self, path: &VirtualPath, options: &DeleteOptions, ctx: &DriverContext) -> CfkResult<()> {
        let (mount, driver, sub_path) = self.resolve_driver(path).await?;
        Self::require(driver.as_ref(), DriverCapabilityBit::Writer, "remove")?;
        if options.recursive && sub_path.is_root() {
            return Err(CfkError::Forbidden("refusing to recursively delete a mount root".into()));
        }
        driver.remove(&sub_path, options, ctx).await?;
        self.emit(&mount, vec![path.clone()], InvalidationReason::Delete);
        Ok(())
    }

    pub async fn batch_remove(
        &self,
        paths: &[VirtualPath],
        options: &DeleteOptions,
        ctx: &DriverContext,
    ) -> CfkResult<BatchResult> {
        let mut succeeded = 0;
        let mut failed = Vec::new();
        for path in paths {
            match self.remove(path, options, ctx).await {
                Ok(()) => succeeded += 1,
                Err(e) => failed.push((path.clone(), e.to_string())),
            }
        }
        Ok(BatchResult { succeeded, failed })
    }

    pub async fn rename(
        &self,
        source: &VirtualPath,
        dest: &VirtualPath,
        options: &MoveOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let (src_mount, src_driver, src_sub) = self.resolve_driver(source).await?;
        let (dest_mount, _dest_driver, dest_sub) = self.resolve_driver(dest).await?;

        if src_mount.id != dest_mount.id {
            return Err(CfkError::Validation("rename across mounts is not supported, use copy+delete".into()));
        }

        Self::require(src_driver.as_ref(), DriverCapabilityBit::Writer, "rename")?;
        let mut entry = src_driver.rename(&src_sub, &dest_sub, options, ctx).await?;
        rebase_entry(&src_mount.mount_path, &mut entry);
        self.emit(&src_mount, vec![source.clone(), dest.clone()], InvalidationReason::Rename);
        Ok(entry)
    }

    /// Copy policy: a same-driver move whose driver advertises atomic copy
    /// is delegated straight through. Anything else -- cross-driver, or a
    /// driver without atomic copy -- is performed by the facade itself as
    /// a streaming `download` piped into `upload`, recursing into
    /// directories one entry at a time.
    pub async fn copy(
        &self,
        source: &VirtualPath,
        dest: &VirtualPath,
        options: &CopyOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let (src_mount, src_driver, src_sub) = self.resolve_driver(source).await?;
        let (dest_mount, dest_driver, dest_sub) = self.resolve_driver(dest).await?;

        let entry = if src_mount.id == dest_mount.id && src_driver.capabilities().atomic {
            let mut entry = src_driver.copy(&src_sub, &dest_sub, options, ctx).await?;
            rebase_entry(&src_mount.mount_path, &mut entry);
            entry
        } else {
            Self::require(src_driver.as_ref(), DriverCapabilityBit::Reader, "copy")?;
            Self::require(dest_driver.as_ref(), DriverCapabilityBit::Writer, "copy")?;
            self.stream_copy(source, dest, options, ctx).await?
        };

        self.emit(&dest_mount, vec![dest.clone()], InvalidationReason::Copy);
        Ok(entry)
    }

    fn stream_copy<'a>(
        &'a self,
        source: &'a VirtualPath,
        dest: &'a VirtualPath,
        options: &'a CopyOptions,
        ctx: &'a DriverContext,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CfkResult<FileEntry>> + Send + 'a>> {
        Box::pin(async move {
            let source_entry = self.stat(source, ctx).await?;

            if source_entry.is_directory {
                let created = self.mkdir(dest, ctx).await?;
                let listing = self.list(source, &ListOptions { recursive: false, ..Default::default() }, ctx).await?;
                for child in listing.entries {
                    let child_name = child.name.clone();
                    self.stream_copy(&child.fs_path, &dest.join(&child_name), options, ctx).await?;
                }
                return Ok(created);
            }

            if options.skip_existing && self.exists(dest, ctx).await? {
                return self.stat(dest, ctx).await;
            }

            let stream = self.download(source, &ReadOptions::default(), ctx).await?;
            let write_options =
                WriteOptions { overwrite: options.overwrite, create_parents: true, ..Default::default() };
            self.upload(dest, stream, Some(source_entry.size), &write_options, ctx).await
        })
    }

    pub async fn search(&self, path: &VirtualPath, options: &SearchOptions, ctx: &DriverContext) -> CfkResult<Vec<FileEntry>> {
        let (mount, driver, _sub_path) = self.resolve_driver(path).await?;
        Self::require(driver.as_ref(), DriverCapabilityBit::Search, "search")?;
        let mut entries = driver.search(options, ctx).await?;
        for entry in &mut entries {
            rebase_entry(&mount.mount_path, entry);
        }
        Ok(entries)
    }

    pub async fn get_space_info(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        let (_mount, driver, _sub_path) = self.resolve_driver(path).await?;
        driver.get_space_info(ctx).await
    }

    /// Three-tier link resolution for the plain JSON/HTTP API (no WebDAV
    /// policy override): an explicit `force_proxy` or a mount configured
    /// for `web_proxy` always goes through the gateway; otherwise a
    /// direct-link-capable driver is preferred, falling back to proxy.
    pub async fn generate_link(
        &self,
        path: &VirtualPath,
        options: &LinkOptions,
        ctx: &DriverContext,
    ) -> CfkResult<LinkOutcome> {
        let (mount, driver, sub_path) = self.resolve_driver(path).await?;

        let key = UrlCacheKey {
            storage_config_id: mount.storage_config_id.clone(),
            sub_path: sub_path.to_path_string(),
            force_download: options.force_download,
            user_kind: ctx.user_kind.clone(),
            user_ref: ctx.user_ref.clone(),
        };
        if let Some(cached) = self.url_cache.get(&key) {
            return Ok(cached);
        }

        let use_proxy = options.force_proxy || mount.web_proxy || !driver.capabilities().direct_link;
        let outcome = if use_proxy {
            driver.generate_proxy_url(&sub_path, options, ctx).await
        } else {
            driver.generate_download_url(&sub_path, options, ctx).await
        }?;

        self.url_cache.put(key, outcome.clone());
        Ok(outcome)
    }

    /// Link resolution for the WebDAV surface, where the mount's
    /// `webdav_policy` overrides the normal tier preference: a redirect
    /// policy forces a direct link, `use_proxy_url` forces the gateway's
    /// own proxy endpoint, and `native_proxy` always streams through the
    /// gateway regardless of what the driver can offer directly.
    pub async fn generate_webdav_link(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<LinkOutcome> {
        let (mount, driver, sub_path) = self.resolve_driver(path).await?;
        let options = LinkOptions::default();

        match mount.webdav_policy {
            WebdavPolicy::Redirect302 if driver.capabilities().direct_link => {
                driver.generate_download_url(&sub_path, &options, ctx).await
            }
            WebdavPolicy::UseProxyUrl | WebdavPolicy::Redirect302 => {
                driver.generate_proxy_url(&sub_path, &options, ctx).await
            }
            WebdavPolicy::NativeProxy => driver.generate_proxy_url(&sub_path, &options, ctx).await,
        }
    }

    // -- resumable multipart upload orchestration --

    pub async fn multipart_init(
        &self,
        path: &VirtualPath,
        init: UploadSessionInit,
        ctx: &DriverContext,
    ) -> CfkResult<UploadSession> {
        let (mount, driver, sub_path) = self.resolve_driver(path).await?;
        Self::require(driver.as_ref(), DriverCapabilityBit::Multipart, "multipart upload")?;

        if let Some(fp) = &init.fingerprint {
            if let Some(existing) = self.resumable_session(&mount, &sub_path, &init, fp)? {
                return Ok(existing);
            }
        }

        let mut session = driver.multipart_init(&sub_path, &init, ctx).await?;
        session.mount_id = mount.id.clone();
        session.storage_config_id = mount.storage_config_id.clone();
        session.fs_path = path.to_path_string();
        self.upload_sessions.insert(&session)?;
        Ok(session)
    }

    fn resumable_session(
        &self,
        mount: &Mount,
        sub_path: &VirtualPath,
        init: &UploadSessionInit,
        fingerprint: &Fingerprint,
    ) -> CfkResult<Option<UploadSession>> {
        Ok(self.upload_sessions.find_by_fingerprint(
            init.user_ref.as_deref(),
            init.user_kind.as_deref(),
            &mount.storage_config_id,
            &sub_path.to_path_string(),
            &init.file_name,
            init.file_size,
            fingerprint,
        )?)
    }

    pub async fn multipart_upload_chunk(
        &self,
        session_id: &str,
        chunk: ByteStream,
        content_range: (u64, u64, u64),
        ctx: &DriverContext,
    ) -> CfkResult<ChunkAck> {
        let mut session = self.upload_sessions.get_or_err(session_id)?;
        let driver = self.mounts.driver_for_storage_config(&session.storage_config_id).await?;
        let ack = driver.multipart_proxy_chunk(&session, chunk, content_range, ctx).await?;
        session.advance(ack.bytes_uploaded);
        session.next_expected_range = ack.next_expected_range.clone();
        self.upload_sessions.save(&session)?;
        Ok(ack)
    }

    pub async fn multipart_probe(&self, session_id: &str, ctx: &DriverContext) -> CfkResult<PartsStatus> {
        let mut session = self.upload_sessions.get_or_err(session_id)?;
        let driver = self.mounts.driver_for_storage_config(&session.storage_config_id).await?;
        let status = driver.multipart_probe(&session, ctx).await?;
        session.advance(status.bytes_uploaded);
        session.uploaded_parts = status.completed_parts.clone();
        session.next_expected_range = status.next_expected_ranges.first().cloned();
        self.upload_sessions.save(&session)?;
        Ok(status)
    }

    pub async fn multipart_complete(
        &self,
        session_id: &str,
        part_etags: &[(u32, String)],
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let mut session = self.upload_sessions.get_or_err(session_id)?;
        let driver = self.mounts.driver_for_storage_config(&session.storage_config_id).await?;
        let entry = driver.multipart_complete(&session, part_etags, ctx).await?;
        session.transition(cfk_core::SessionStatus::Completed);
        self.upload_sessions.save(&session)?;

        if let Ok(Resolution::Driver { mount, .. }) = self.mounts.resolve(&VirtualPath::new(&session.fs_path)).await {
            self.emit(&mount, vec![VirtualPath::new(&session.fs_path)], InvalidationReason::Create);
        }
        Ok(entry)
    }

    pub async fn multipart_abort(&self, session_id: &str, ctx: &DriverContext) -> CfkResult<()> {
        let mut session = self.upload_sessions.get_or_err(session_id)?;
        let driver = self.mounts.driver_for_storage_config(&session.storage_config_id).await?;
        driver.multipart_abort(&session, ctx).await?;
        session.transition(cfk_core::SessionStatus::Aborted);
        self.upload_sessions.save(&session)?;
        Ok(())
    }

    pub fn multipart_list(&self, prefix: &VirtualPath) -> CfkResult<Vec<UploadSession>> {
        Ok(self.upload_sessions.list_active_under(&prefix.to_path_string())?)
    }
}

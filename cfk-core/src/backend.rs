//! The storage driver contract and its capability model.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::{
    entry::{DirectoryListing, FileEntry},
    error::CfkResult,
    link::LinkOutcome,
    operations::*,
    session::{ChunkAck, PartsStatus, UploadSession, UploadSessionInit},
    VirtualPath,
};

/// Byte stream type returned by `download`.
pub type ByteStream = Pin<Box<dyn Stream<Item = CfkResult<Bytes>> + Send>>;

/// Capability bits a driver declares at construction. The facade consults
/// this before dispatching any operation and rejects unsupported ones with
/// `NOT_IMPLEMENTED` rather than calling into the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverCapabilities {
    pub reader: bool,
    pub writer: bool,
    pub multipart: bool,
    pub atomic: bool,
    pub direct_link: bool,
    pub proxy: bool,
    pub search: bool,
    pub presigned: bool,
}

impl DriverCapabilities {
    pub const fn none() -> Self {
        Self {
            reader: false,
            writer: false,
            multipart: false,
            atomic: false,
            direct_link: false,
            proxy: false,
            search: false,
            presigned: false,
        }
    }

    /// Full read/write driver with atomic same-driver copy (S3-compatible).
    pub const fn full_presigned() -> Self {
        Self {
            reader: true,
            writer: true,
            multipart: true,
            atomic: true,
            direct_link: true,
            proxy: true,
            search: true,
            presigned: true,
        }
    }

    /// Read/write driver without presigned URLs (Google Drive, OneDrive, WebDAV).
    pub const fn full_proxied() -> Self {
        Self {
            reader: true,
            writer: true,
            multipart: true,
            atomic: true,
            direct_link: true,
            proxy: true,
            search: true,
            presigned: false,
        }
    }

    pub const fn read_only() -> Self {
        Self {
            reader: true,
            writer: false,
            multipart: false,
            atomic: false,
            direct_link: true,
            proxy: true,
            search: false,
            presigned: false,
        }
    }

    pub fn requires(&self, required: DriverCapabilityBit) -> bool {
        match required {
            DriverCapabilityBit::Reader => self.reader,
            DriverCapabilityBit::Writer => self.writer,
            DriverCapabilityBit::Multipart => self.multipart,
            DriverCapabilityBit::Atomic => self.atomic,
            DriverCapabilityBit::DirectLink => self.direct_link,
            DriverCapabilityBit::Proxy => self.proxy,
            DriverCapabilityBit::Search => self.search,
            DriverCapabilityBit::Presigned => self.presigned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCapabilityBit {
    Reader,
    Writer,
    Multipart,
    Atomic,
    DirectLink,
    Proxy,
    Search,
    Presigned,
}

/// Space information for `df`-style reporting.
#[derive(Debug, Clone, Default)]
pub struct SpaceInfo {
    pub total: Option<u64>,
    pub used: Option<u64>,
    pub available: Option<u64>,
}

impl SpaceInfo {
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Context passed to every driver call: who's asking, and how to cancel.
#[derive(Clone)]
pub struct DriverContext {
    pub user_ref: Option<String>,
    pub user_kind: Option<String>,
    pub cancel: tokio_util::sync::CancellationToken,
}

impl DriverContext {
    pub fn background() -> Self {
        Self { user_ref: None, user_kind: None, cancel: tokio_util::sync::CancellationToken::new() }
    }
}

/// The contract every storage driver implements. A driver only needs real
/// bodies for the operations its [`DriverCapabilities`] advertise; the rest
/// may use the provided default, which returns `CfkError::Unsupported`.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Stable identifier for this driver instance (the owning mount or
    /// storage-config id), used in logs and in `FileEntry::mount_id`.
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn capabilities(&self) -> DriverCapabilities;

    async fn is_available(&self) -> bool;
    async fn stat(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<FileEntry>;
    async fn exists(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<bool>;
    async fn list(
        &self,
        path: &VirtualPath,
        options: &ListOptions,
        ctx: &DriverContext,
    ) -> CfkResult<DirectoryListing>;
    async fn download(
        &self,
        path: &VirtualPath,
        options: &ReadOptions,
        ctx: &DriverContext,
    ) -> CfkResult<ByteStream>;
    async fn upload(
        &self,
        path: &VirtualPath,
        data: ByteStream,
        content_length: Option<u64>,
        options: &WriteOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry>;
    async fn mkdir(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<FileEntry>;
    async fn remove(&self, path: &VirtualPath, options: &DeleteOptions, ctx: &DriverContext) -> CfkResult<()>;
    async fn rename(
        &self,
        source: &VirtualPath,
        dest: &VirtualPath,
        options: &MoveOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry>;
    async fn copy(
        &self,
        source: &VirtualPath,
        dest: &VirtualPath,
        options: &CopyOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry>;
    async fn get_space_info(&self, _ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        Ok(SpaceInfo::unknown())
    }

    async fn batch_remove(
        &self,
        paths: &[VirtualPath],
        options: &DeleteOptions,
        ctx: &DriverContext,
    ) -> CfkResult<BatchResult> {
        let mut failed = Vec::new();
        for path in paths {
            if let Err(e) = self.remove(path, options, ctx).await {
                failed.push((path.clone(), e.to_string()));
            }
        }
        Ok(BatchResult { succeeded: paths.len() - failed.len(), failed })
    }

    async fn search(&self, _options: &SearchOptions, _ctx: &DriverContext) -> CfkResult<Vec<FileEntry>> {
        Err(crate::CfkError::not_implemented("search"))
    }

    async fn generate_download_url(
        &self,
        _path: &VirtualPath,
        _options: &LinkOptions,
        _ctx: &DriverContext,
    ) -> CfkResult<LinkOutcome> {
        Err(crate::CfkError::not_implemented("direct download links"))
    }

    async fn generate_proxy_url(
        &self,
        _path: &VirtualPath,
        _options: &LinkOptions,
        _ctx: &DriverContext,
    ) -> CfkResult<LinkOutcome> {
        Err(crate::CfkError::not_implemented("proxy links"))
    }

    // -- multipart / resumable upload entry points (see cfk-core::session) --

    async fn multipart_init(
        &self,
        _path: &VirtualPath,
        _init: &UploadSessionInit,
        _ctx: &DriverContext,
    ) -> CfkResult<UploadSession> {
        Err(crate::CfkError::not_implemented("multipart upload"))
    }

    async fn multipart_proxy_chunk(
        &self,
        _session: &UploadSession,
        _chunk: ByteStream,
        _content_range: (u64, u64, u64),
        _ctx: &DriverContext,
    ) -> CfkResult<ChunkAck> {
        Err(crate::CfkError::not_implemented("multipart upload"))
    }

    async fn multipart_probe(&self, _session: &UploadSession, _ctx: &DriverContext) -> CfkResult<PartsStatus> {
        Err(crate::CfkError::not_implemented("multipart upload"))
    }

    async fn multipart_complete(
        &self,
        _session: &UploadSession,
        _part_etags: &[(u32, String)],
        _ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        Err(crate::CfkError::not_implemented("multipart upload"))
    }

    async fn multipart_abort(&self, _session: &UploadSession, _ctx: &DriverContext) -> CfkResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: Vec<(VirtualPath, String)>,
}

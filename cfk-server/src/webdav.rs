//! The RFC 4918 WebDAV surface, adapting the filesystem facade to
//! `dav_server`'s `DavFileSystem` contract.
//!
//! Locking is delegated entirely to `dav_server::memls::MemLs`, which
//! already implements the opaque-token, refreshable, TTL-expiring lock
//! table this surface needs -- there is nothing gateway-specific about
//! LOCK/UNLOCK, so nothing extra is built here for it.

use std::future::Future;
use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsResult, FsStream, OpenOptions, ReadDirMeta,
};
use futures::{stream, StreamExt};

use cfk_core::operations::{DeleteOptions, ListOptions, MoveOptions, ReadOptions, WriteOptions};
use cfk_core::{CfkError, DriverContext, FileEntry, VirtualPath};
use cfk_mount::FileSystem;

fn to_fs_error(err: CfkError) -> FsError {
    match err {
        CfkError::NotFound(_) | CfkError::UploadSessionNotFound(_) => FsError::NotFound,
        CfkError::Unauthorized(_) | CfkError::Forbidden(_) => FsError::Forbidden,
        CfkError::NotImplemented(_) => FsError::NotImplemented,
        _ => FsError::GeneralFailure,
    }
}

fn to_system_time(at: Option<DateTime<Utc>>) -> FsResult<SystemTime> {
    at.map(|dt| SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(dt.timestamp().max(0) as u64))
        .ok_or(FsError::GeneralFailure)
}

fn dav_path_to_virtual(path: &DavPath) -> VirtualPath {
    VirtualPath::new(path.as_pathbuf().to_string_lossy().as_ref())
}

#[derive(Debug, Clone)]
pub struct GatewayDavMetaData {
    is_dir: bool,
    size: u64,
    modified: Option<DateTime<Utc>>,
}

impl From<&FileEntry> for GatewayDavMetaData {
    fn from(entry: &FileEntry) -> Self {
        Self { is_dir: entry.is_directory, size: entry.size, modified: entry.modified }
    }
}

impl DavMetaData for GatewayDavMetaData {
    fn len(&self) -> u64 {
        self.size
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn modified(&self) -> FsResult<SystemTime> {
        to_system_time(self.modified)
    }

    fn created(&self) -> FsResult<SystemTime> {
        to_system_time(self.modified)
    }
}

pub struct GatewayDavDirEntry {
    name: String,
    meta: GatewayDavMetaData,
}

impl DavDirEntry for GatewayDavDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }
}

/// A single open WebDAV resource. Reads eagerly buffer the whole object
/// (the facade only exposes a one-shot byte stream, not random access);
/// writes buffer in memory and are flushed to the facade as one `upload`
/// call, matching the gateway's single-buffer PUT mode.
pub struct GatewayDavFile {
    fs: Arc<FileSystem>,
    path: VirtualPath,
    read_buf: Option<Bytes>,
    position: u64,
    write_buf: BytesMut,
    writable: bool,
    size: u64,
}

impl DavFile for GatewayDavFile {
    fn metadata(&mut self) -> FsFuture<Box<dyn DavMetaData>> {
        let size = if self.writable { self.write_buf.len() as u64 } else { self.size };
        Box::pin(async move {
            Ok(Box::new(GatewayDavMetaData { is_dir: false, size, modified: None }) as Box<dyn DavMetaData>)
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<()> {
        while buf.has_remaining() {
            let chunk = buf.chunk().to_vec();
            let len = chunk.len();
            self.write_buf.extend_from_slice(&chunk);
            buf.advance(len);
        }
        Box::pin(async move { Ok(()) })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<()> {
        self.write_buf.extend_from_slice(&buf);
        Box::pin(async move { Ok(()) })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<Bytes> {
        let buf = self.read_buf.clone().unwrap_or_default();
        let pos = self.position as usize;
        let end = (pos + count).min(buf.len());
        let slice = if pos < buf.len() { buf.slice(pos..end) } else { Bytes::new() };
        self.position += slice.len() as u64;
        Box::pin(async move { Ok(slice) })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<u64> {
        let size = self.size;
        let new_pos = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::End(n) => (size as i64 + n).max(0) as u64,
            SeekFrom::Current(n) => (self.position as i64 + n).max(0) as u64,
        };
        self.position = new_pos;
        Box::pin(async move { Ok(new_pos) })
    }

    fn flush(&mut self) -> FsFuture<()> {
        if !self.writable {
            return Box::pin(async move { Ok(()) });
        }
        let fs = self.fs.clone();
        let path = self.path.clone();
        let data = self.write_buf.split().freeze();
        Box::pin(async move {
            let len = data.len() as u64;
            let stream = Box::pin(stream::once(async move { Ok(data) }));
            let options = WriteOptions { overwrite: true, create_parents: true, ..Default::default() };
            fs.upload(&path, stream, Some(len), &options, &DriverContext::background())
                .await
                .map(|_| ())
                .map_err(to_fs_error)
        })
    }
}

#[derive(Clone)]
pub struct GatewayDavFs {
    fs: Arc<FileSystem>,
}

impl GatewayDavFs {
    pub fn new(fs: Arc<FileSystem>) -> Self {
        Self { fs }
    }
}

impl DavFileSystem for GatewayDavFs {
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<Box<dyn DavFile>> {
        let fs = self.fs.clone();
        let vpath = dav_path_to_virtual(path);
        Box::pin(async move {
            if options.write {
                return Ok(Box::new(GatewayDavFile {
                    fs,
                    path: vpath,
                    read_buf: None,
                    position: 0,
                    write_buf: BytesMut::new(),
                    writable: true,
                    size: 0,
                }) as Box<dyn DavFile>);
            }

            let entry = fs.stat(&vpath, &DriverContext::background()).await.map_err(to_fs_error)?;
            let mut stream = fs
                .download(&vpath, &ReadOptions::default(), &DriverContext::background())
                .await
                .map_err(to_fs_error)?;
            let mut buf = BytesMut::with_capacity(entry.size as usize);
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk.map_err(to_fs_error)?);
            }

            Ok(Box::new(GatewayDavFile {
                fs,
                path: vpath,
                read_buf: Some(buf.freeze()),
                position: 0,
                write_buf: BytesMut::new(),
                writable: false,
                size: entry.size,
            }) as Box<dyn DavFile>)
        })
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath, _meta: ReadDirMeta) -> FsFuture<FsStream<Box<dyn DavDirEntry>>> {
        let fs = self.fs.clone();
        let vpath = dav_path_to_virtual(path);
        Box::pin(async move {
            let listing = fs
                .list(&vpath, &ListOptions::default(), &DriverContext::background())
                .await
                .map_err(to_fs_error)?;
            let entries: Vec<Box<dyn DavDirEntry>> = listing
                .entries
                .iter()
                .map(|e| Box::new(GatewayDavDirEntry { name: e.name.clone(), meta: e.into() }) as Box<dyn DavDirEntry>)
                .collect();
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<Box<dyn DavDirEntry>>)
        })
    }

    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>> {
        let fs = self.fs.clone();
        let vpath = dav_path_to_virtual(path);
        Box::pin(async move {
            let entry = fs.stat(&vpath, &DriverContext::background()).await.map_err(to_fs_error)?;
            Ok(Box::new(GatewayDavMetaData::from(&entry)) as Box<dyn DavMetaData>)
        })
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let fs = self.fs.clone();
        let vpath = dav_path_to_virtual(path);
        Box::pin(async move { fs.mkdir(&vpath, &DriverContext::background()).await.map(|_| ()).map_err(to_fs_error) })
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let fs = self.fs.clone();
        let vpath = dav_path_to_virtual(path);
        Box::pin(async move {
            fs.remove(&vpath, &DeleteOptions::default(), &DriverContext::background()).await.map_err(to_fs_error)
        })
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let fs = self.fs.clone();
        let vpath = dav_path_to_virtual(path);
        Box::pin(async move {
            let options = DeleteOptions { recursive: true, ..Default::default() };
            fs.remove(&vpath, &options, &DriverContext::background()).await.map_err(to_fs_error)
        })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        let fs = self.fs.clone();
        let from = dav_path_to_virtual(from);
        let to = dav_path_to_virtual(to);
        Box::pin(rename_or_copy_delete(fs, from, to))
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        let fs = self.fs.clone();
        let from = dav_path_to_virtual(from);
        let to = dav_path_to_virtual(to);
        Box::pin(async move {
            fs.copy(&from, &to, &cfk_core::operations::CopyOptions::default(), &DriverContext::background())
                .await
                .map(|_| ())
                .map_err(to_fs_error)
        })
    }
}

/// MOVE across mounts: the facade rejects a cross-mount rename outright,
/// so fall back to copy-then-delete-source, rolling back the copy if the
/// delete fails.
fn rename_or_copy_delete(
    fs: Arc<FileSystem>,
    from: VirtualPath,
    to: VirtualPath,
) -> Pin<Box<dyn Future<Output = FsResult<()>> + Send>> {
    Box::pin(async move {
        let ctx = DriverContext::background();
        match fs.rename(&from, &to, &MoveOptions::default(), &ctx).await {
            Ok(_) => Ok(()),
            Err(CfkError::Validation(_)) => {
                fs.copy(&from, &to, &cfk_core::operations::CopyOptions::default(), &ctx)
                    .await
                    .map_err(to_fs_error)?;
                if let Err(e) = fs.remove(&from, &DeleteOptions { recursive: true, ..Default::default() }, &ctx).await
                {
                    fs.remove(&to, &DeleteOptions { recursive: true, ..Default::default() }, &ctx).await.ok();
                    return Err(to_fs_error(e));
                }
                Ok(())
            }
            Err(e) => Err(to_fs_error(e)),
        }
    })
}

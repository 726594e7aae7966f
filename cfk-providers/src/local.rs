//! Local filesystem driver.

use async_trait::async_trait;
use bytes::Bytes;
use cfk_core::{
    backend::{ByteStream, DriverCapabilities, DriverContext, SpaceInfo, StorageDriver},
    entry::{DirectoryListing, FileEntry},
    error::{CfkError, CfkResult},
    operations::*,
    VirtualPath,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Driver rooted at a single directory on the host filesystem.
pub struct LocalDriver {
    id: String,
    root: PathBuf,
}

impl LocalDriver {
    pub fn new(id: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self { id: id.into(), root: root.as_ref().to_path_buf() }
    }

    fn to_real_path(&self, path: &VirtualPath) -> PathBuf {
        let mut real = self.root.clone();
        for seg in path.segments() {
            real.push(seg);
        }
        real
    }

    async fn entry_from_path(&self, path: &VirtualPath, real: &Path) -> CfkResult<FileEntry> {
        let meta = fs::metadata(real).await?;
        let modified = meta.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
        let entry = if meta.is_dir() {
            FileEntry::directory(path.clone(), &self.id, "local")
        } else {
            FileEntry::file(path.clone(), meta.len(), &self.id, "local")
        };
        Ok(if let Some(m) = modified { entry.with_modified(m) } else { entry })
    }
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Local Filesystem"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities { search: false, multipart: false, presigned: false, ..DriverCapabilities::full_proxied() }
    }

    async fn is_available(&self) -> bool {
        self.root.exists()
    }

    async fn stat(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        let real = self.to_real_path(path);
        if !real.exists() {
            return Err(CfkError::NotFound(path.to_path_string()));
        }
        self.entry_from_path(path, &real).await
    }

    async fn exists(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<bool> {
        Ok(self.to_real_path(path).exists())
    }

    async fn list(
        &self,
        path: &VirtualPath,
        _options: &ListOptions,
        _ctx: &DriverContext,
    ) -> CfkResult<DirectoryListing> {
        let real = self.to_real_path(path);
        if !real.is_dir() {
            return Err(CfkError::Validation(format!("not a directory: {path}")));
        }

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&real).await?;
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let child_path = path.join(dir_entry.file_name().to_string_lossy());
            let child_real = dir_entry.path();
            entries.push(self.entry_from_path(&child_path, &child_real).await?);
        }

        Ok(DirectoryListing::new(path.clone(), entries))
    }

    async fn download(&self, path: &VirtualPath, options: &ReadOptions, _ctx: &DriverContext) -> CfkResult<ByteStream> {
        let real = self.to_real_path(path);
        if !real.is_file() {
            return Err(CfkError::Validation(format!("not a file: {path}")));
        }

        let mut file = fs::File::open(&real).await?;
        let buffer = if let Some((start, end)) = options.range {
            use tokio::io::AsyncSeekExt;
            file.seek(std::io::SeekFrom::Start(start)).await?;
            let mut buf = vec![0u8; (end - start + 1) as usize];
            file.read_exact(&mut buf).await?;
            buf
        } else {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await?;
            buf
        };

        let bytes = Bytes::from(buffer);
        Ok(Box::pin(futures::stream::once(async { Ok(bytes) })))
    }

    async fn upload(
        &self,
        path: &VirtualPath,
        mut data: ByteStream,
        _content_length: Option<u64>,
        options: &WriteOptions,
        _ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let real = self.to_real_path(path);

        if real.exists() && !options.overwrite {
            return Err(CfkError::Conflict(path.to_path_string()));
        }
        if options.create_parents {
            if let Some(parent) = real.parent() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(&real).await?;
        while let Some(chunk) = data.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        self.stat(path, &DriverContext::background()).await
    }

    async fn mkdir(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        let real = self.to_real_path(path);
        fs::create_dir_all(&real).await?;
        self.stat(path, &DriverContext::background()).await
    }

    async fn remove(&self, path: &VirtualPath, options: &DeleteOptions, _ctx: &DriverContext) -> CfkResult<()> {
        let real = self.to_real_path(path);

        if !real.exists() {
            if options.force {
                return Ok(());
            }
            return Err(CfkError::NotFound(path.to_path_string()));
        }

        if real.is_dir() {
            if options.recursive {
                fs::remove_dir_all(&real).await?;
            } else {
                fs::remove_dir(&real).await?;
            }
        } else {
            fs::remove_file(&real).await?;
        }
        Ok(())
    }

    async fn rename(
        &self,
        source: &VirtualPath,
        dest: &VirtualPath,
        options: &MoveOptions,
        _ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let src_real = self.to_real_path(source);
        let dst_real = self.to_real_path(dest);

        if !src_real.exists() {
            return Err(CfkError::NotFound(source.to_path_string()));
        }
        if dst_real.exists() && !options.overwrite {
            return Err(CfkError::Conflict(dest.to_path_string()));
        }

        fs::rename(&src_real, &dst_real).await?;
        self.stat(dest, &DriverContext::background()).await
    }

    async fn copy(
        &self,
        source: &VirtualPath,
        dest: &VirtualPath,
        options: &CopyOptions,
        _ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let src_real = self.to_real_path(source);
        let dst_real = self.to_real_path(dest);

        if !src_real.exists() {
            return Err(CfkError::NotFound(source.to_path_string()));
        }
        if dst_real.exists() {
            if options.skip_existing {
                return self.stat(dest, &DriverContext::background()).await;
            }
            if !options.overwrite {
                return Err(CfkError::Conflict(dest.to_path_string()));
            }
        }

        if src_real.is_dir() {
            copy_dir_recursive(&src_real, &dst_real).await?;
        } else {
            if let Some(parent) = dst_real.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(&src_real, &dst_real).await?;
        }
        self.stat(dest, &DriverContext::background()).await
    }

    async fn get_space_info(&self, _ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        Ok(SpaceInfo::unknown())
    }
}

fn copy_dir_recursive<'a>(src: &'a Path, dst: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = CfkResult<()>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(dst).await?;
        let mut read_dir = fs::read_dir(src).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let child_src = entry.path();
            let child_dst = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                copy_dir_recursive(&child_src, &child_dst).await?;
            } else {
                fs::copy(&child_src, &child_dst).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfk_core::backend::DriverContext;

    #[tokio::test]
    async fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new("local", dir.path());
        let ctx = DriverContext::background();
        let path = VirtualPath::new("/a/b.txt");

        let data: ByteStream = Box::pin(futures::stream::once(async { Ok(Bytes::from_static(b"hello")) }));
        driver
            .upload(&path, data, Some(5), &WriteOptions { create_parents: true, ..Default::default() }, &ctx)
            .await
            .unwrap();

        let mut stream = driver.download(&path, &ReadOptions::default(), &ctx).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn mkdir_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new("local", dir.path());
        let ctx = DriverContext::background();
        driver.mkdir(&VirtualPath::new("/sub"), &ctx).await.unwrap();

        let listing = driver.list(&VirtualPath::root(), &ListOptions::default(), &ctx).await.unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert!(listing.entries[0].is_directory);
    }
}

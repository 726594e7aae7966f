//! The common file/directory projection every driver returns.

use crate::VirtualPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The shape a driver returns for one file or directory, as specified by
/// the gateway's projection: enough to render a listing or answer `stat`
/// without the caller knowing which provider backs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub fs_path: VirtualPath,
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub mimetype: Option<String>,
    pub etag: Option<String>,
    /// Set for synthesized entries (mount-tree directories, GitHub Releases
    /// overlay nodes) that do not correspond to a real provider object.
    pub is_virtual: bool,
    pub mount_id: String,
    pub storage_type: String,
}

impl FileEntry {
    pub fn directory(fs_path: VirtualPath, mount_id: impl Into<String>, storage_type: impl Into<String>) -> Self {
        let name = fs_path.name().unwrap_or("").to_string();
        Self {
            fs_path,
            name,
            is_directory: true,
            size: 0,
            modified: None,
            mimetype: Some("application/x-directory".to_string()),
            etag: None,
            is_virtual: false,
            mount_id: mount_id.into(),
            storage_type: storage_type.into(),
        }
    }

    pub fn virtual_directory(fs_path: VirtualPath, mount_id: impl Into<String>) -> Self {
        let mut e = Self::directory(fs_path, mount_id, "virtual");
        e.is_virtual = true;
        e
    }

    pub fn file(
        fs_path: VirtualPath,
        size: u64,
        mount_id: impl Into<String>,
        storage_type: impl Into<String>,
    ) -> Self {
        let name = fs_path.name().unwrap_or("").to_string();
        Self {
            fs_path,
            name,
            is_directory: false,
            size,
            modified: None,
            mimetype: None,
            etag: None,
            is_virtual: false,
            mount_id: mount_id.into(),
            storage_type: storage_type.into(),
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Directory listing result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: VirtualPath,
    pub entries: Vec<FileEntry>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl DirectoryListing {
    pub fn new(path: VirtualPath, entries: Vec<FileEntry>) -> Self {
        Self { path, entries, cursor: None, has_more: false }
    }
}

//! Storage drivers for Czech File Knife.
//!
//! Each backend implements [`cfk_core::StorageDriver`] against its own
//! protocol; the gateway's mount layer is the only caller that needs to
//! know which one is in play.

mod local;

#[cfg(feature = "s3")]
pub mod s3;

#[cfg(feature = "webdav")]
pub mod webdav;

#[cfg(feature = "gdrive")]
pub mod gdrive;

#[cfg(feature = "onedrive")]
pub mod onedrive;

#[cfg(feature = "github")]
pub mod github;

pub use local::LocalDriver;

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Driver};

#[cfg(feature = "webdav")]
pub use webdav::{WebDavAuth, WebDavConfig, WebDavDriver};

#[cfg(feature = "gdrive")]
pub use gdrive::{GoogleDriveConfig, GoogleDriveDriver, GoogleTokens};

#[cfg(feature = "onedrive")]
pub use onedrive::{OneDriveConfig, OneDriveDriver, OneDriveTokens};

#[cfg(feature = "github")]
pub use github::{parse_repo_structure, GithubConfig, GithubDriver, RepoMapping};

use cfk_core::{CfkError, CfkResult, StorageDriver};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of live driver instances, keyed by mount/storage-config id.
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn StorageDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self { drivers: HashMap::new() }
    }

    pub fn register(&mut self, driver: Arc<dyn StorageDriver>) {
        self.drivers.insert(driver.id().to_string(), driver);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn StorageDriver>> {
        self.drivers.get(id).cloned()
    }

    pub fn get_or_err(&self, id: &str) -> CfkResult<Arc<dyn StorageDriver>> {
        self.get(id).ok_or_else(|| CfkError::NotFound(format!("driver {id}")))
    }

    pub fn list(&self) -> Vec<&str> {
        self.drivers.keys().map(|s| s.as_str()).collect()
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<dyn StorageDriver>> {
        self.drivers.remove(id)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Mount and storage-config records.
//!
//! These are the administrator-facing configuration objects the mount
//! manager resolves against; persistence is left to a repository trait
//! (see `cfk-mount::repository`) so the core crate stays storage-agnostic.

use crate::VirtualPath;
use serde::{Deserialize, Serialize};

/// How a WebDAV mount hands out download URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebdavPolicy {
    /// Stream every download through the gateway itself.
    NativeProxy,
    /// Redirect the client to a provider-authoritative URL when possible.
    Redirect302,
    /// Rewrite to the gateway's own `url_proxy` endpoint.
    UseProxyUrl,
}

impl Default for WebdavPolicy {
    fn default() -> Self {
        WebdavPolicy::NativeProxy
    }
}

/// An administrator-defined attachment point in the unified namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    pub id: String,
    pub mount_path: VirtualPath,
    pub storage_config_id: String,
    pub web_proxy: bool,
    pub webdav_policy: WebdavPolicy,
    pub cache_ttl_secs: u64,
    pub active: bool,
    /// Registration order; used only as a documentation aid -- the
    /// longest-prefix rule never needs a tiebreaker because overlapping
    /// mount paths at equal length are rejected at registration.
    pub order: i64,
}

impl Mount {
    pub fn is_match(&self, path: &VirtualPath) -> bool {
        self.active && path.is_sub_path_of(&self.mount_path)
    }
}

/// Provider discriminant and generic policy flags. The credential payload
/// itself is opaque to the core -- concrete drivers downcast `params` via
/// their own typed config (see `cfk-providers::s3::S3Config` and friends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub id: String,
    pub driver_type: String,
    pub url_proxy: Option<String>,
    pub signature_expires_in_secs: u64,
    pub chunk_size_mb: u64,
    /// Encrypted-at-rest credential blob; see `CredentialCipher`.
    pub credentials: Vec<u8>,
}

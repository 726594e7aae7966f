//! Gateway configuration.
//!
//! Loaded once at startup from `--config`/`CFK_CONFIG`, falling back to a
//! `directories::ProjectDirs`-resolved default, exactly as `cfk-cache`'s own
//! config types already do.

use std::path::{Path, PathBuf};

use cfk_core::mount::{Mount, WebdavPolicy};
use cfk_core::VirtualPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub listen: ListenConfig,
    pub db_path: PathBuf,
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_api_addr")]
    pub api_addr: String,
    #[serde(default = "default_webdav_addr")]
    pub webdav_addr: String,
    #[serde(default = "default_webdav_prefix")]
    pub webdav_prefix: String,
}

/// An inline mount declaration for environments without a separate admin
/// database -- loaded into the `sled`-backed repository on first boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub id: String,
    pub mount_path: String,
    pub storage_config_id: String,
    #[serde(default)]
    pub web_proxy: bool,
    #[serde(default)]
    pub webdav_policy: WebdavPolicy,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub order: i64,
}

impl From<MountConfig> for Mount {
    fn from(m: MountConfig) -> Self {
        Mount {
            id: m.id,
            mount_path: VirtualPath::new(m.mount_path),
            storage_config_id: m.storage_config_id,
            web_proxy: m.web_proxy,
            webdav_policy: m.webdav_policy,
            cache_ttl_secs: m.cache_ttl_secs,
            active: m.active,
            order: m.order,
        }
    }
}

fn default_api_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_webdav_addr() -> String {
    "127.0.0.1:8081".into()
}

fn default_webdav_prefix() -> String {
    "/dav".into()
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            api_addr: default_api_addr(),
            webdav_addr: default_webdav_addr(),
            webdav_prefix: default_webdav_prefix(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("could not resolve a default config directory")]
    NoDefaultDir,
}

impl GatewayConfig {
    /// Resolution order: an explicit `--config` path, then `CFK_CONFIG`,
    /// then `directories::ProjectDirs`' config dir, then built-in defaults
    /// with `db_path` under the project's data dir.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("CFK_CONFIG").map(PathBuf::from))
            .or_else(Self::default_config_path);

        match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
                toml::from_str(&text).map_err(|e| ConfigError::Parse(path, e))
            }
            _ => Self::with_default_db_path(),
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cfk", "czech-file-knife")
            .map(|dirs| dirs.config_dir().join("gateway.toml"))
    }

    fn with_default_db_path() -> Result<Self, ConfigError> {
        let data_dir = directories::ProjectDirs::from("com", "cfk", "czech-file-knife")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoDefaultDir)?;

        Ok(Self {
            listen: ListenConfig::default(),
            db_path: data_dir.join("gateway.db"),
            default_cache_ttl_secs: default_cache_ttl_secs(),
            mounts: Vec::new(),
        })
    }
}

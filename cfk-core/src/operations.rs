//! Per-operation option structs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    pub recursive: bool,
    pub include_hidden: bool,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    /// Bypass any metadata cache (the `refresh=1` query flag).
    pub refresh: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    pub range: Option<(u64, u64)>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<chrono::DateTime<chrono::Utc>>,
    pub if_match: Option<String>,
    pub if_unmodified_since: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    pub overwrite: bool,
    pub create_parents: bool,
    pub content_hash: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyOptions {
    pub overwrite: bool,
    pub skip_existing: bool,
    pub preserve_metadata: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub recursive: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: String,
    pub search_path: Option<String>,
    pub recursive: bool,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkOptions {
    pub expires_in_secs: Option<u64>,
    pub force_download: bool,
    pub force_proxy: bool,
}

//! Download link resolution outcomes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A provider-authoritative URL that carries its own authorization.
    Direct,
    /// The gateway's own streaming proxy endpoint.
    Proxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub url: String,
    pub kind: LinkKind,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    pub expires_in_secs: Option<u64>,
}

impl LinkOutcome {
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: LinkKind::Direct,
            content_type: None,
            etag: None,
            last_modified: None,
            expires_in_secs: None,
        }
    }

    pub fn proxy(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: LinkKind::Proxy,
            content_type: None,
            etag: None,
            last_modified: None,
            expires_in_secs: None,
        }
    }

    pub fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in_secs = Some(secs);
        self
    }
}

//! GitHub Releases read-only driver.
//!
//! Presents one or more GitHub repositories' releases as a browsable,
//! downloadable directory tree. Has no teacher precedent among the other
//! drivers; authored directly from the Releases API.

use async_trait::async_trait;
use bytes::Bytes;
use cfk_core::{
    backend::{ByteStream, DriverCapabilities, DriverContext, SpaceInfo, StorageDriver},
    entry::{DirectoryListing, FileEntry},
    error::{CfkError, CfkResult},
    link::LinkOutcome,
    operations::*,
    VirtualPath,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const GITHUB_API: &str = "https://api.github.com";
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const MAX_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RepoMapping {
    /// Mount-relative root this repo is overlaid at ("" for a single-repo mount).
    pub root: String,
    pub owner: String,
    pub repo: String,
}

/// Parses `repo_structure` lines: `owner/repo`, `alias:owner/repo`, or a
/// full `https://github.com/owner/repo[/...]` URL. A single mapping may use
/// `/` as its root; more than one requires every entry to carry an alias.
pub fn parse_repo_structure(text: &str) -> CfkResult<Vec<RepoMapping>> {
    let mut mappings = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (alias, rest) = match line.split_once(':') {
            Some((a, r)) if !a.contains('/') => (Some(a.trim().to_string()), r.trim()),
            _ => (None, line),
        };

        let (owner, repo) = if let Some(stripped) = rest.strip_prefix("https://github.com/") {
            let mut parts = stripped.trim_end_matches('/').splitn(3, '/');
            let owner = parts.next().unwrap_or_default().to_string();
            let repo = parts.next().unwrap_or_default().to_string();
            (owner, repo)
        } else {
            let mut parts = rest.splitn(2, '/');
            let owner = parts.next().unwrap_or_default().to_string();
            let repo = parts.next().unwrap_or_default().to_string();
            (owner, repo)
        };

        if owner.is_empty() || repo.is_empty() {
            return Err(CfkError::Validation(format!("invalid repo_structure line: {raw_line}")));
        }

        mappings.push(RepoMapping { root: alias.unwrap_or_default(), owner, repo });
    }

    if mappings.len() > 1 && mappings.iter().any(|m| m.root.is_empty()) {
        return Err(CfkError::Validation("multiple repos require an alias for every entry".into()));
    }
    Ok(mappings)
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct GithubConfig {
    pub mappings: Vec<RepoMapping>,
    pub show_all_version: bool,
    pub show_release_notes: bool,
    pub show_source_code: bool,
    pub show_readme: bool,
    pub gh_proxy: Option<String>,
    pub token: Option<String>,
    pub cache_ttl: Duration,
}

impl GithubConfig {
    pub fn new(mappings: Vec<RepoMapping>) -> Self {
        Self {
            mappings,
            show_all_version: false,
            show_release_notes: false,
            show_source_code: false,
            show_readme: false,
            gh_proxy: None,
            token: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseAsset {
    name: String,
    size: u64,
    browser_download_url: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
    zipball_url: Option<String>,
    tarball_url: Option<String>,
    published_at: Option<String>,
}

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

#[derive(Default)]
struct RepoCache {
    releases: Option<CacheEntry<Vec<Release>>>,
    readme: Option<CacheEntry<Option<String>>>,
    license: Option<CacheEntry<Option<String>>>,
}

pub struct GithubDriver {
    id: String,
    config: GithubConfig,
    http: Client,
    cache: Arc<RwLock<HashMap<String, RepoCache>>>,
}

impl GithubDriver {
    pub fn new(id: impl Into<String>, config: GithubConfig) -> Self {
        Self { id: id.into(), config, http: Client::new(), cache: Arc::new(RwLock::new(HashMap::new())) }
    }

    fn repo_key(mapping: &RepoMapping) -> String {
        format!("{}/{}", mapping.owner, mapping.repo)
    }

    fn resolve_mapping(&self, path: &VirtualPath) -> Option<(&RepoMapping, &[String])> {
        for mapping in &self.config.mappings {
            if mapping.root.is_empty() {
                return Some((mapping, path.segments()));
            }
            if path.segments().first().map(|s| s.as_str()) == Some(mapping.root.as_str()) {
                return Some((mapping, &path.segments()[1..]));
            }
        }
        None
    }

    fn rewrite_url(&self, url: &str) -> String {
        match &self.config.gh_proxy {
            Some(proxy) => url.replacen("https://github.com", proxy.trim_end_matches('/'), 1),
            None => url.to_string(),
        }
    }

    async fn request(&self, url: &str) -> CfkResult<reqwest::Response> {
        let mut request = self.http.get(url).header(header::USER_AGENT, "cfk-github-driver");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|e| CfkError::driver("github", e.to_string()))
    }

    async fn releases(&self, mapping: &RepoMapping, refresh: bool) -> CfkResult<Vec<Release>> {
        let key = Self::repo_key(mapping);
        let ttl = self.config.cache_ttl.min(MAX_CACHE_TTL);

        if !refresh {
            if let Some(entry) = self.cache.read().await.get(&key).and_then(|c| c.releases.as_ref()) {
                if entry.fetched_at.elapsed() < ttl {
                    return Ok(entry.value.clone());
                }
            }
        }

        let url = format!("{GITHUB_API}/repos/{}/{}/releases", mapping.owner, mapping.repo);
        let response = self.request(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CfkError::NotFound(format!("{}/{}", mapping.owner, mapping.repo)));
        }
        if !response.status().is_success() {
            return Err(CfkError::driver("github", format!("list releases failed: {}", response.status())));
        }
        let releases: Vec<Release> = response.json().await.map_err(|e| CfkError::driver("github", e.to_string()))?;

        let mut cache = self.cache.write().await;
        cache.entry(key).or_default().releases = Some(CacheEntry { value: releases.clone(), fetched_at: Instant::now() });
        Ok(releases)
    }

    async fn readme(&self, mapping: &RepoMapping) -> Option<String> {
        let key = Self::repo_key(mapping);
        let ttl = self.config.cache_ttl.min(MAX_CACHE_TTL);
        if let Some(entry) = self.cache.read().await.get(&key).and_then(|c| c.readme.as_ref()) {
            if entry.fetched_at.elapsed() < ttl {
                return entry.value.clone();
            }
        }

        let url = format!("https://raw.githubusercontent.com/{}/{}/HEAD/README.md", mapping.owner, mapping.repo);
        let body = self.request(&url).await.ok().and_then(|r| if r.status().is_success() { Some(r) } else { None });
        let text = match body {
            Some(r) => r.text().await.ok(),
            None => None,
        };
        self.cache.write().await.entry(key).or_default().readme = Some(CacheEntry { value: text.clone(), fetched_at: Instant::now() });
        text
    }

    async fn license(&self, mapping: &RepoMapping) -> Option<String> {
        let key = Self::repo_key(mapping);
        let ttl = self.config.cache_ttl.min(MAX_CACHE_TTL);
        if let Some(entry) = self.cache.read().await.get(&key).and_then(|c| c.license.as_ref()) {
            if entry.fetched_at.elapsed() < ttl {
                return entry.value.clone();
            }
        }

        let url = format!("{GITHUB_API}/repos/{}/{}/license", mapping.owner, mapping.repo);
        #[derive(Deserialize)]
        struct LicenseResp {
            content: String,
        }
        let text = match self.request(&url).await {
            Ok(r) if r.status().is_success() => r.json::<LicenseResp>().await.ok().and_then(|lr| {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.decode(lr.content.replace('\n', "")).ok().and_then(|b| String::from_utf8(b).ok())
            }),
            _ => None,
        };
        self.cache.write().await.entry(key).or_default().license = Some(CacheEntry { value: text.clone(), fetched_at: Instant::now() });
        text
    }

    fn release_asset_entries(mount_id: &str, base: &VirtualPath, release: &Release) -> Vec<FileEntry> {
        release
            .assets
            .iter()
            .map(|asset| {
                let mut entry = FileEntry::file(base.join(&asset.name), asset.size, mount_id, "github");
                if let Some(updated) = &asset.updated_at {
                    if let Ok(dt) = DateTime::parse_from_rfc3339(updated) {
                        entry = entry.with_modified(dt.with_timezone(&Utc));
                    }
                }
                entry
            })
            .collect()
    }

    fn extra_entries(&self, mount_id: &str, base: &VirtualPath, release: &Release) -> Vec<FileEntry> {
        let mut entries = Vec::new();
        if self.config.show_release_notes {
            if let Some(body) = &release.body {
                if !body.trim().is_empty() {
                    entries.push(FileEntry::file(base.join("RELEASE_NOTES.md"), body.len() as u64, mount_id, "github"));
                }
            }
        }
        if self.config.show_source_code {
            if release.zipball_url.is_some() {
                entries.push(FileEntry::file(base.join("Source code (zip)"), 0, mount_id, "github"));
            }
            if release.tarball_url.is_some() {
                entries.push(FileEntry::file(base.join("Source code (tar.gz)"), 0, mount_id, "github"));
            }
        }
        entries
    }
}

#[async_trait]
impl StorageDriver for GithubDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "GitHub Releases"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::read_only()
    }

    async fn is_available(&self) -> bool {
        !self.config.mappings.is_empty()
    }

    async fn stat(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<FileEntry> {
        if path.is_root() {
            return Ok(FileEntry::directory(path.clone(), &self.id, "github"));
        }
        let listing = self.list(&path.parent().unwrap_or_else(VirtualPath::root), &ListOptions::default(), ctx).await?;
        listing.entries.into_iter().find(|e| &e.fs_path == path).ok_or_else(|| CfkError::NotFound(path.to_path_string()))
    }

    async fn exists(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<bool> {
        match self.stat(path, ctx).await {
            Ok(_) => Ok(true),
            Err(CfkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &VirtualPath, options: &ListOptions, _ctx: &DriverContext) -> CfkResult<DirectoryListing> {
        // Mount root with more than one mapping: list alias directories.
        if path.is_root() && self.config.mappings.len() > 1 {
            let entries = self.config.mappings.iter().map(|m| FileEntry::virtual_directory(path.join(&m.root), &self.id)).collect();
            return Ok(DirectoryListing::new(path.clone(), entries));
        }

        let Some((mapping, sub)) = self.resolve_mapping(path) else {
            return Err(CfkError::NotFound(path.to_path_string()));
        };
        let mapping = mapping.clone();
        let releases = self.releases(&mapping, options.refresh).await?;

        // Non-versioned mode: root lists the latest release directly.
        if !self.config.show_all_version {
            if !sub.is_empty() {
                return Err(CfkError::NotFound(path.to_path_string()));
            }
            let Some(latest) = releases.first() else {
                return Ok(DirectoryListing::new(path.clone(), Vec::new()));
            };
            let mut entries = Self::release_asset_entries(&self.id, path, latest);
            entries.extend(self.extra_entries(&self.id, path, latest));
            if self.config.show_readme {
                if self.readme(&mapping).await.is_some() {
                    entries.push(FileEntry::file(path.join("README.md"), 0, &self.id, "github"));
                }
                if self.license(&mapping).await.is_some() {
                    entries.push(FileEntry::file(path.join("LICENSE"), 0, &self.id, "github"));
                }
            }
            return Ok(DirectoryListing::new(path.clone(), entries));
        }

        // Versioned mode: each release is a tag-named subdirectory.
        if sub.is_empty() {
            let mut entries: Vec<FileEntry> = releases.iter().map(|r| FileEntry::virtual_directory(path.join(&r.tag_name), &self.id)).collect();
            if self.config.show_readme {
                if self.readme(&mapping).await.is_some() {
                    entries.push(FileEntry::file(path.join("README.md"), 0, &self.id, "github"));
                }
                if self.license(&mapping).await.is_some() {
                    entries.push(FileEntry::file(path.join("LICENSE"), 0, &self.id, "github"));
                }
            }
            return Ok(DirectoryListing::new(path.clone(), entries));
        }

        let tag = &sub[0];
        let release = releases.iter().find(|r| &r.tag_name == tag).ok_or_else(|| CfkError::NotFound(path.to_path_string()))?;
        let mut entries = Self::release_asset_entries(&self.id, path, release);
        entries.extend(self.extra_entries(&self.id, path, release));
        Ok(DirectoryListing::new(path.clone(), entries))
    }

    async fn download(&self, path: &VirtualPath, options: &ReadOptions, ctx: &DriverContext) -> CfkResult<ByteStream> {
        let outcome = self.generate_download_url(path, &LinkOptions::default(), ctx).await?;
        let mut request = self.http.get(&outcome.url);
        if let Some((start, end)) = options.range {
            request = request.header(header::RANGE, format!("bytes={start}-{end}"));
        }
        let response = request.send().await.map_err(|e| CfkError::driver("github", e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(CfkError::driver("github", format!("asset download failed: {}", response.status())));
        }
        let stream = response.bytes_stream().map(|r| r.map_err(|e| CfkError::driver("github", e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn upload(&self, _path: &VirtualPath, _data: ByteStream, _content_length: Option<u64>, _options: &WriteOptions, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        Err(CfkError::not_implemented("github releases driver is read-only"))
    }

    async fn mkdir(&self, _path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        Err(CfkError::not_implemented("github releases driver is read-only"))
    }

    async fn remove(&self, _path: &VirtualPath, _options: &DeleteOptions, _ctx: &DriverContext) -> CfkResult<()> {
        Err(CfkError::not_implemented("github releases driver is read-only"))
    }

    async fn rename(&self, _source: &VirtualPath, _dest: &VirtualPath, _options: &MoveOptions, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        Err(CfkError::not_implemented("github releases driver is read-only"))
    }

    async fn copy(&self, _source: &VirtualPath, _dest: &VirtualPath, _options: &CopyOptions, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        Err(CfkError::not_implemented("github releases driver is read-only"))
    }

    async fn get_space_info(&self, _ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        Ok(SpaceInfo::unknown())
    }

    async fn generate_download_url(&self, path: &VirtualPath, _options: &LinkOptions, _ctx: &DriverContext) -> CfkResult<LinkOutcome> {
        let Some((mapping, sub)) = self.resolve_mapping(path) else {
            return Err(CfkError::NotFound(path.to_path_string()));
        };
        let mapping = mapping.clone();
        let name = path.name().unwrap_or_default();
        let releases = self.releases(&mapping, false).await?;

        let (release, asset_name) = if self.config.show_all_version && sub.len() >= 2 {
            let tag = &sub[0];
            (releases.iter().find(|r| &r.tag_name == tag).ok_or_else(|| CfkError::NotFound(path.to_path_string()))?, name)
        } else {
            (releases.first().ok_or_else(|| CfkError::NotFound(path.to_path_string()))?, name)
        };

        let url = match asset_name {
            "Source code (zip)" => release.zipball_url.clone(),
            "Source code (tar.gz)" => release.tarball_url.clone(),
            "README.md" => None,
            _ => release.assets.iter().find(|a| a.name == asset_name).map(|a| a.browser_download_url.clone()),
        };
        let url = url.ok_or_else(|| CfkError::NotFound(path.to_path_string()))?;

        let mut outcome = LinkOutcome::direct(self.rewrite_url(&url));
        if let Some(published) = &release.published_at {
            if let Ok(dt) = DateTime::parse_from_rfc3339(published) {
                outcome.last_modified = Some(dt.with_timezone(&Utc));
            }
        }
        Ok(outcome)
    }
}

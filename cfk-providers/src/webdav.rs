//! WebDAV storage driver.
//!
//! HTTP-based distributed authoring and versioning protocol. Compatible
//! with NextCloud, ownCloud, SharePoint, and Apache mod_dav. This is the
//! *client* role, talking outward to a remote WebDAV provider -- the
//! gateway's own WebDAV server surface lives in cfk-server.

use async_trait::async_trait;
use bytes::Bytes;
use cfk_core::{
    backend::{ByteStream, DriverCapabilities, DriverContext, SpaceInfo, StorageDriver},
    entry::{DirectoryListing, FileEntry},
    error::{CfkError, CfkResult},
    operations::*,
    VirtualPath,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Client, Method, StatusCode};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum WebDavAuth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebDavConfig {
    /// e.g. "https://cloud.example.com/remote.php/dav/files/username"
    pub base_url: String,
    pub auth: WebDavAuth,
    pub headers: Vec<(String, String)>,
}

pub struct WebDavDriver {
    id: String,
    config: Arc<RwLock<WebDavConfig>>,
    http: Client,
}

impl WebDavDriver {
    pub fn new(id: impl Into<String>, config: WebDavConfig) -> Self {
        Self { id: id.into(), config: Arc::new(RwLock::new(config)), http: Client::new() }
    }

    pub fn nextcloud(id: impl Into<String>, server_url: &str, username: &str, password: &str) -> Self {
        let base_url = format!("{}/remote.php/dav/files/{}", server_url.trim_end_matches('/'), username);
        Self::new(
            id,
            WebDavConfig {
                base_url,
                auth: WebDavAuth::Basic { username: username.to_string(), password: password.to_string() },
                headers: vec![],
            },
        )
    }

    pub fn owncloud(id: impl Into<String>, server_url: &str, username: &str, password: &str) -> Self {
        let base_url = format!("{}/remote.php/webdav", server_url.trim_end_matches('/'));
        Self::new(
            id,
            WebDavConfig {
                base_url,
                auth: WebDavAuth::Basic { username: username.to_string(), password: password.to_string() },
                headers: vec![],
            },
        )
    }

    async fn request(&self, method: Method, url_path: &str) -> reqwest::RequestBuilder {
        let config = self.config.read().await;
        let url = format!("{}/{}", config.base_url.trim_end_matches('/'), url_path.trim_start_matches('/'));
        let mut request = self.http.request(method, &url);
        match &config.auth {
            WebDavAuth::None => {}
            WebDavAuth::Basic { username, password } => request = request.basic_auth(username, Some(password)),
            WebDavAuth::Bearer(token) => request = request.bearer_auth(token),
        }
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }
        request
    }

    async fn dest_url(&self, url_path: &str) -> String {
        let config = self.config.read().await;
        format!("{}/{}", config.base_url.trim_end_matches('/'), url_path.trim_start_matches('/'))
    }

    fn to_url_path(&self, path: &VirtualPath) -> String {
        path.segments().iter().map(|s| urlencoding::encode(s).to_string()).collect::<Vec<_>>().join("/")
    }

    async fn propfind(&self, url_path: &str, depth: &str) -> CfkResult<Vec<DavResponse>> {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:getetag/>
    <d:getcontenttype/>
  </d:prop>
</d:propfind>"#;

        let response = self
            .request(Method::from_bytes(b"PROPFIND").unwrap(), url_path)
            .await
            .header("Depth", depth)
            .header(header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::MULTI_STATUS {
            if response.status() == StatusCode::NOT_FOUND {
                return Err(CfkError::NotFound(url_path.to_string()));
            }
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CfkError::driver_with_details("webdav", format!("propfind failed: {status}"), text));
        }

        let text = response.text().await.map_err(|e| CfkError::driver("webdav", e.to_string()))?;
        Ok(parse_multistatus(&text))
    }
}

#[derive(Debug, Clone, Default)]
struct DavResponse {
    href: String,
    is_collection: bool,
    content_length: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
    etag: Option<String>,
    content_type: Option<String>,
}

impl DavResponse {
    fn to_entry(&self, mount_id: &str, path: VirtualPath) -> FileEntry {
        let mut entry = if self.is_collection {
            FileEntry::directory(path, mount_id, "webdav")
        } else {
            FileEntry::file(path, self.content_length.unwrap_or(0), mount_id, "webdav")
        };
        entry.modified = self.last_modified;
        entry.etag = self.etag.clone();
        entry.mimetype = self.content_type.clone();
        entry
    }
}

fn parse_multistatus(xml: &str) -> Vec<DavResponse> {
    let mut responses = Vec::new();
    let mut current: Option<DavResponse> = None;

    for line in xml.lines() {
        let line = line.trim();
        if line.contains("<d:response>") || line.contains("<D:response>") {
            current = Some(DavResponse::default());
        } else if line.contains("</d:response>") || line.contains("</D:response>") {
            if let Some(resp) = current.take() {
                responses.push(resp);
            }
        } else if let Some(resp) = current.as_mut() {
            if let Some(href) = extract_tag_content(line, "href") {
                resp.href = urlencoding::decode(&href).map(|c| c.to_string()).unwrap_or(href);
            }
            if line.contains("<d:collection") || line.contains("<D:collection") {
                resp.is_collection = true;
            }
            if let Some(len) = extract_tag_content(line, "getcontentlength") {
                resp.content_length = len.parse().ok();
            }
            if let Some(modified) = extract_tag_content(line, "getlastmodified") {
                resp.last_modified = parse_http_date(&modified);
            }
            if let Some(etag) = extract_tag_content(line, "getetag") {
                resp.etag = Some(etag.trim_matches('"').to_string());
            }
            if let Some(ct) = extract_tag_content(line, "getcontenttype") {
                resp.content_type = Some(ct);
            }
        }
    }

    responses
}

fn extract_tag_content(line: &str, tag: &str) -> Option<String> {
    for ns in ["d", "D"] {
        let start_tag = format!("<{ns}:{tag}>");
        let end_tag = format!("</{ns}:{tag}>");
        if let Some(start) = line.find(&start_tag) {
            let content_start = start + start_tag.len();
            if let Some(end) = line[content_start..].find(&end_tag) {
                return Some(line[content_start..content_start + end].to_string());
            }
        }
    }
    None
}

fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let formats = ["%a, %d %b %Y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];
    for fmt in formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }
    None
}

#[async_trait]
impl StorageDriver for WebDavDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "WebDAV"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities { presigned: false, ..DriverCapabilities::full_proxied() }
    }

    async fn is_available(&self) -> bool {
        self.propfind("", "0").await.is_ok()
    }

    async fn stat(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        let url_path = self.to_url_path(path);
        let responses = self.propfind(&url_path, "0").await?;
        responses
            .first()
            .map(|r| r.to_entry(&self.id, path.clone()))
            .ok_or_else(|| CfkError::NotFound(path.to_path_string()))
    }

    async fn exists(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<bool> {
        match self.stat(path, ctx).await {
            Ok(_) => Ok(true),
            Err(CfkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &VirtualPath, _options: &ListOptions, _ctx: &DriverContext) -> CfkResult<DirectoryListing> {
        let url_path = self.to_url_path(path);
        let responses = self.propfind(&url_path, "1").await?;

        let entries = responses
            .iter()
            .skip(1) // first entry is the collection itself
            .map(|r| {
                let name = r.href.trim_end_matches('/').rsplit('/').next().unwrap_or("");
                r.to_entry(&self.id, path.join(name))
            })
            .collect();

        Ok(DirectoryListing::new(path.clone(), entries))
    }

    async fn download(&self, path: &VirtualPath, options: &ReadOptions, _ctx: &DriverContext) -> CfkResult<ByteStream> {
        let url_path = self.to_url_path(path);
        let mut request = self.request(Method::GET, &url_path).await;
        if let Some((start, end)) = options.range {
            request = request.header(header::RANGE, format!("bytes={start}-{end}"));
        }

        let response = request.send().await.map_err(|e| CfkError::driver("webdav", e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::PARTIAL_CONTENT {
            if response.status() == StatusCode::NOT_FOUND {
                return Err(CfkError::NotFound(path.to_path_string()));
            }
            return Err(CfkError::driver("webdav", format!("get failed: {}", response.status())));
        }

        let stream = response.bytes_stream().map(|r| r.map_err(|e| CfkError::driver("webdav", e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn upload(
        &self,
        path: &VirtualPath,
        mut data: ByteStream,
        _content_length: Option<u64>,
        _options: &WriteOptions,
        ctx: &DriverContext,
    ) -> CfkResult<FileEntry> {
        let mut buf = Vec::new();
        while let Some(chunk) = data.next().await {
            buf.extend_from_slice(&chunk?);
        }

        let url_path = self.to_url_path(path);
        let response = self
            .request(Method::PUT, &url_path)
            .await
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(buf)
            .send()
            .await
            .map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        if !response.status().is_success() {
            return Err(CfkError::driver("webdav", format!("put failed: {}", response.status())));
        }
        self.stat(path, ctx).await
    }

    async fn mkdir(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<FileEntry> {
        let url_path = self.to_url_path(path);
        let response = self
            .request(Method::from_bytes(b"MKCOL").unwrap(), &url_path)
            .await
            .send()
            .await
            .map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::CREATED {
            return Err(CfkError::driver("webdav", format!("mkcol failed: {}", response.status())));
        }
        self.stat(path, ctx).await
    }

    async fn remove(&self, path: &VirtualPath, options: &DeleteOptions, _ctx: &DriverContext) -> CfkResult<()> {
        let url_path = self.to_url_path(path);
        let response = self.request(Method::DELETE, &url_path).await.send().await.map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            if options.force {
                return Ok(());
            }
            return Err(CfkError::NotFound(path.to_path_string()));
        }
        if !response.status().is_success() && response.status() != StatusCode::NO_CONTENT {
            return Err(CfkError::driver("webdav", format!("delete failed: {}", response.status())));
        }
        Ok(())
    }

    async fn rename(&self, source: &VirtualPath, dest: &VirtualPath, options: &MoveOptions, ctx: &DriverContext) -> CfkResult<FileEntry> {
        let from_path = self.to_url_path(source);
        let to_path = self.to_url_path(dest);
        let dest_url = self.dest_url(&to_path).await;

        let response = self
            .request(Method::from_bytes(b"MOVE").unwrap(), &from_path)
            .await
            .header("Destination", &dest_url)
            .header("Overwrite", if options.overwrite { "T" } else { "F" })
            .send()
            .await
            .map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::CREATED && response.status() != StatusCode::NO_CONTENT {
            if response.status() == StatusCode::PRECONDITION_FAILED {
                return Err(CfkError::Conflict(dest.to_path_string()));
            }
            return Err(CfkError::driver("webdav", format!("move failed: {}", response.status())));
        }
        self.stat(dest, ctx).await
    }

    async fn copy(&self, source: &VirtualPath, dest: &VirtualPath, options: &CopyOptions, ctx: &DriverContext) -> CfkResult<FileEntry> {
        if options.skip_existing && self.exists(dest, ctx).await? {
            return self.stat(dest, ctx).await;
        }

        let from_path = self.to_url_path(source);
        let to_path = self.to_url_path(dest);
        let dest_url = self.dest_url(&to_path).await;

        let response = self
            .request(Method::from_bytes(b"COPY").unwrap(), &from_path)
            .await
            .header("Destination", &dest_url)
            .header("Overwrite", if options.overwrite { "T" } else { "F" })
            .send()
            .await
            .map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::CREATED && response.status() != StatusCode::NO_CONTENT {
            if response.status() == StatusCode::PRECONDITION_FAILED {
                return Err(CfkError::Conflict(dest.to_path_string()));
            }
            return Err(CfkError::driver("webdav", format!("copy failed: {}", response.status())));
        }
        self.stat(dest, ctx).await
    }

    async fn get_space_info(&self, _ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:quota-available-bytes/>
    <d:quota-used-bytes/>
  </d:prop>
</d:propfind>"#;

        let response = self
            .request(Method::from_bytes(b"PROPFIND").unwrap(), "")
            .await
            .header("Depth", "0")
            .header(header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| CfkError::driver("webdav", e.to_string()))?;

        let text = response.text().await.map_err(|e| CfkError::driver("webdav", e.to_string()))?;
        let available = extract_tag_content(&text, "quota-available-bytes").and_then(|s| s.parse().ok());
        let used = extract_tag_content(&text, "quota-used-bytes").and_then(|s| s.parse().ok());
        let total = match (available, used) {
            (Some(a), Some(u)) => Some(a + u),
            _ => None,
        };

        Ok(SpaceInfo { total, used, available })
    }
}

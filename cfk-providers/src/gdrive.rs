//! Google Drive storage driver.
//!
//! Drive API v3 over OAuth 2.0 + PKCE. Drive has no native path addressing,
//! so every path-taking call resolves segment-by-segment through a file-ID
//! cache, and no native recursive copy, so directory copies walk the tree
//! here.

use async_trait::async_trait;
use bytes::Bytes;
use cfk_core::{
    backend::{ByteStream, DriverCapabilities, DriverContext, SpaceInfo, StorageDriver},
    entry::{DirectoryListing, FileEntry},
    error::{CfkError, CfkResult},
    link::LinkOutcome,
    operations::*,
    session::{ChunkAck, PartsStatus, UploadSession, UploadSessionInit, UploadStrategy},
    VirtualPath,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Virtual top-level directory listing everything shared with this account
/// rather than owned by it. Resolved specially since Drive has no parent
/// folder id for "shared with me".
const SHARED_WITH_ME: &str = "__shared_with_me__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

pub struct GoogleDriveDriver {
    id: String,
    config: GoogleDriveConfig,
    tokens: Arc<RwLock<Option<GoogleTokens>>>,
    http: Client,
    path_cache: Arc<RwLock<HashMap<String, String>>>,
}

impl GoogleDriveDriver {
    pub fn new(id: impl Into<String>, config: GoogleDriveConfig) -> Self {
        Self {
            id: id.into(),
            config,
            tokens: Arc::new(RwLock::new(None)),
            http: Client::new(),
            path_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn oauth_client(&self) -> BasicClient {
        let mut client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string()).unwrap())
            .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).unwrap())
            .set_redirect_uri(RedirectUrl::new(self.config.redirect_uri.clone()).unwrap());
        if let Some(secret) = &self.config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        client
    }

    pub fn start_auth(&self) -> (String, PkceCodeVerifier) {
        let client = self.oauth_client();
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, _csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("https://www.googleapis.com/auth/drive".to_string()))
            .add_scope(Scope::new("https://www.googleapis.com/auth/drive.metadata.readonly".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        (auth_url.to_string(), pkce_verifier)
    }

    pub async fn complete_auth(&self, code: &str, verifier: PkceCodeVerifier) -> CfkResult<GoogleTokens> {
        let mut params = vec![
            ("code", code.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("code_verifier", verifier.secret().to_string()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.clone()));
        }

        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CfkError::Unauthorized(format!("token exchange failed: {text}")));
        }

        #[derive(Deserialize)]
        struct TokenResp {
            access_token: String,
            refresh_token: Option<String>,
            expires_in: Option<i64>,
        }
        let resp: TokenResp = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        let tokens = GoogleTokens {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: resp.expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };
        *self.tokens.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    pub async fn set_tokens(&self, tokens: GoogleTokens) {
        *self.tokens.write().await = Some(tokens);
    }

    /// Returns a live access token, transparently exchanging the refresh
    /// token once if the current one is expired or about to expire.
    async fn access_token(&self) -> CfkResult<String> {
        {
            let guard = self.tokens.read().await;
            if let Some(tokens) = guard.as_ref() {
                let fresh = tokens.expires_at.map(|exp| exp > Utc::now() + chrono::Duration::seconds(30)).unwrap_or(true);
                if fresh {
                    return Ok(tokens.access_token.clone());
                }
            } else {
                return Err(CfkError::Unauthorized("not authenticated".into()));
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> CfkResult<String> {
        let refresh_token = {
            let guard = self.tokens.read().await;
            guard.as_ref().and_then(|t| t.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            return Err(CfkError::Unauthorized("no refresh token available".into()));
        };

        let client = self.oauth_client();
        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| CfkError::Unauthorized(format!("refresh failed: {e}")))?;

        let access_token = response.access_token().secret().clone();
        let expires_at = response.expires_in().map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64));

        let mut guard = self.tokens.write().await;
        *guard = Some(GoogleTokens { access_token: access_token.clone(), refresh_token: Some(refresh_token), expires_at });
        Ok(access_token)
    }

    /// Runs `f` with a valid bearer token, retrying once on a 401 by
    /// forcing a refresh -- Drive access tokens can expire mid-flight even
    /// when our local clock thinks they haven't.
    async fn with_access_token<F, Fut>(&self, f: F) -> CfkResult<reqwest::Response>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let token = self.access_token().await?;
        let response = f(token).await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_token().await?;
            return f(token).await.map_err(|e| CfkError::driver("gdrive", e.to_string()));
        }
        Ok(response)
    }

    fn is_shared_with_me(path: &VirtualPath) -> bool {
        path.segments().first().map(|s| s.as_str()) == Some(SHARED_WITH_ME)
    }

    async fn resolve_file_id(&self, path: &VirtualPath) -> CfkResult<String> {
        if path.is_root() {
            return Ok("root".to_string());
        }
        if Self::is_shared_with_me(path) && path.depth() == 1 {
            return Ok(SHARED_WITH_ME.to_string());
        }

        let key = path.to_path_string();
        if let Some(id) = self.path_cache.read().await.get(&key) {
            return Ok(id.clone());
        }

        let shared_root = Self::is_shared_with_me(path);
        let segments: &[String] = if shared_root { &path.segments()[1..] } else { path.segments() };
        let mut current_id = if shared_root { None } else { Some("root".to_string()) };

        for segment in segments {
            let query = match &current_id {
                Some(parent) => format!("'{parent}' in parents and name = '{segment}' and trashed = false"),
                None => format!("sharedWithMe = true and name = '{segment}' and trashed = false"),
            };

            let token = self.access_token().await?;
            let response = self
                .http
                .get(format!("{DRIVE_API_URL}/files"))
                .bearer_auth(token)
                .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
                .send()
                .await
                .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

            #[derive(Deserialize)]
            struct FileList {
                files: Vec<DriveFile>,
            }
            let list: FileList = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
            current_id = Some(list.files.first().map(|f| f.id.clone()).ok_or_else(|| CfkError::NotFound(path.to_path_string()))?);
        }

        let id = current_id.ok_or_else(|| CfkError::NotFound(path.to_path_string()))?;
        self.path_cache.write().await.insert(key, id.clone());
        Ok(id)
    }

    async fn parent_id_for(&self, path: &VirtualPath) -> CfkResult<String> {
        match path.parent() {
            Some(parent) if !parent.is_root() => self.resolve_file_id(&parent).await,
            _ => Ok("root".to_string()),
        }
    }

    async fn invalidate(&self, path: &VirtualPath) {
        self.path_cache.write().await.remove(&path.to_path_string());
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    modified_time: Option<String>,
    md5_checksum: Option<String>,
}

impl DriveFile {
    fn to_entry(&self, mount_id: &str, path: VirtualPath) -> FileEntry {
        let mut entry = if self.mime_type == FOLDER_MIME {
            FileEntry::directory(path, mount_id, "gdrive")
        } else {
            FileEntry::file(path, self.size.as_ref().and_then(|s| s.parse().ok()).unwrap_or(0), mount_id, "gdrive")
        };
        if let Some(modified) = &self.modified_time {
            if let Ok(dt) = DateTime::parse_from_rfc3339(modified) {
                entry = entry.with_modified(dt.with_timezone(&Utc));
            }
        }
        entry.mimetype = Some(self.mime_type.clone());
        entry.etag = self.md5_checksum.clone();
        entry
    }
}

#[async_trait]
impl StorageDriver for GoogleDriveDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Google Drive"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities { presigned: false, ..DriverCapabilities::full_proxied() }
    }

    async fn is_available(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    async fn stat(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        if path.is_root() {
            return Ok(FileEntry::directory(path.clone(), &self.id, "gdrive"));
        }
        let file_id = self.resolve_file_id(path).await?;
        let response = self
            .with_access_token(|token| {
                let http = &self.http;
                let url = format!("{DRIVE_API_URL}/files/{file_id}");
                async move {
                    http.get(&url)
                        .bearer_auth(token)
                        .query(&[("fields", "id,name,mimeType,size,modifiedTime,md5Checksum")])
                        .send()
                        .await
                }
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CfkError::NotFound(path.to_path_string()));
        }
        if !response.status().is_success() {
            return Err(CfkError::driver("gdrive", format!("get metadata failed: {}", response.status())));
        }
        let file: DriveFile = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        Ok(file.to_entry(&self.id, path.clone()))
    }

    async fn exists(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<bool> {
        match self.stat(path, ctx).await {
            Ok(_) => Ok(true),
            Err(CfkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &VirtualPath, _options: &ListOptions, _ctx: &DriverContext) -> CfkResult<DirectoryListing> {
        if path.is_root() {
            return Ok(DirectoryListing::new(path.clone(), vec![FileEntry::virtual_directory(path.join(SHARED_WITH_ME), &self.id)]));
        }

        let folder_id = self.resolve_file_id(path).await?;
        let shared = folder_id == SHARED_WITH_ME;
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query = if shared { "sharedWithMe = true".to_string() } else { format!("'{folder_id}' in parents and trashed = false") };

            let token = self.access_token().await?;
            let mut request = self
                .http
                .get(format!("{DRIVE_API_URL}/files"))
                .bearer_auth(token)
                .query(&[("q", query.as_str()), ("fields", "nextPageToken,files(id,name,mimeType,size,modifiedTime,md5Checksum)"), ("pageSize", "1000")]);
            if let Some(tok) = &page_token {
                request = request.query(&[("pageToken", tok.as_str())]);
            }

            let response = request.send().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct FileList {
                files: Vec<DriveFile>,
                next_page_token: Option<String>,
            }
            let list: FileList = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

            for file in &list.files {
                entries.push(file.to_entry(&self.id, path.join(&file.name)));
            }
            page_token = list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(DirectoryListing::new(path.clone(), entries))
    }

    async fn download(&self, path: &VirtualPath, options: &ReadOptions, _ctx: &DriverContext) -> CfkResult<ByteStream> {
        let file_id = self.resolve_file_id(path).await?;
        let token = self.access_token().await?;

        let mut request = self.http.get(format!("{DRIVE_API_URL}/files/{file_id}?alt=media")).bearer_auth(token);
        if let Some((start, end)) = options.range {
            request = request.header(header::RANGE, format!("bytes={start}-{end}"));
        }

        let response = request.send().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(CfkError::driver("gdrive", format!("download failed: {}", response.status())));
        }
        let stream = response.bytes_stream().map(|r| r.map_err(|e| CfkError::driver("gdrive", e.to_string())));
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

        let token = self.access_token().await?;
        let existing_id = self.resolve_file_id(path).await.ok();

        let file: DriveFile = if let Some(file_id) = existing_id {
            let response = self
                .http
                .patch(format!("{DRIVE_UPLOAD_URL}/files/{file_id}?uploadType=media"))
                .bearer_auth(token)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(buf)
                .send()
                .await
                .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
            response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?
        } else {
            let parent_id = self.parent_id_for(path).await?;
            let name = path.name().unwrap_or_default().to_string();

            #[derive(Serialize)]
            struct NewFileMetadata {
                name: String,
                parents: Vec<String>,
            }
            let metadata_json = serde_json::to_string(&NewFileMetadata { name, parents: vec![parent_id] })
                .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

            let boundary = "cfk_boundary";
            let mut body = format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata_json}\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .into_bytes();
            body.extend_from_slice(&buf);
            body.extend_from_slice(format!("\r\n--{boundary}--").as_bytes());

            let response = self
                .http
                .post(format!("{DRIVE_UPLOAD_URL}/files?uploadType=multipart"))
                .bearer_auth(token)
                .header(header::CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
                .body(body)
                .send()
                .await
                .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
            response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?
        };

        self.invalidate(path).await;
        let _ = ctx;
        Ok(file.to_entry(&self.id, path.clone()))
    }

    async fn mkdir(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        let parent_id = self.parent_id_for(path).await?;
        let name = path.name().unwrap_or_default().to_string();
        let token = self.access_token().await?;

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct FolderMetadata {
            name: String,
            mime_type: String,
            parents: Vec<String>,
        }
        let response = self
            .http
            .post(format!("{DRIVE_API_URL}/files"))
            .bearer_auth(token)
            .json(&FolderMetadata { name, mime_type: FOLDER_MIME.to_string(), parents: vec![parent_id] })
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        let file: DriveFile = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        Ok(file.to_entry(&self.id, path.clone()))
    }

    async fn remove(&self, path: &VirtualPath, options: &DeleteOptions, _ctx: &DriverContext) -> CfkResult<()> {
        let file_id = match self.resolve_file_id(path).await {
            Ok(id) => id,
            Err(CfkError::NotFound(_)) if options.force => return Ok(()),
            Err(e) => return Err(e),
        };
        let token = self.access_token().await?;
        let response = self
            .http
            .delete(format!("{DRIVE_API_URL}/files/{file_id}"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::NO_CONTENT {
            return Err(CfkError::driver("gdrive", format!("delete failed: {}", response.status())));
        }
        self.invalidate(path).await;
        Ok(())
    }

    async fn rename(&self, source: &VirtualPath, dest: &VirtualPath, _options: &MoveOptions, ctx: &DriverContext) -> CfkResult<FileEntry> {
        let file_id = self.resolve_file_id(source).await?;
        let old_parent_id = self.parent_id_for(source).await?;
        let new_parent_id = self.parent_id_for(dest).await?;
        let name = dest.name().unwrap_or_default().to_string();
        let token = self.access_token().await?;

        #[derive(Serialize)]
        struct UpdateMetadata {
            name: String,
        }
        let response = self
            .http
            .patch(format!("{DRIVE_API_URL}/files/{file_id}?addParents={new_parent_id}&removeParents={old_parent_id}"))
            .bearer_auth(token)
            .json(&UpdateMetadata { name })
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        let file: DriveFile = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        self.invalidate(source).await;
        let _ = ctx;
        Ok(file.to_entry(&self.id, dest.clone()))
    }

    async fn copy(&self, source: &VirtualPath, dest: &VirtualPath, options: &CopyOptions, ctx: &DriverContext) -> CfkResult<FileEntry> {
        if options.skip_existing && self.exists(dest, ctx).await? {
            return self.stat(dest, ctx).await;
        }

        let source_entry = self.stat(source, ctx).await?;
        if source_entry.is_directory {
            let dest_entry = self.mkdir(dest, ctx).await?;
            let listing = self.list(source, &ListOptions::default(), ctx).await?;
            for child in listing.entries {
                let child_dest = dest.join(&child.name);
                self.copy(&child.fs_path, &child_dest, options, ctx).await?;
            }
            return Ok(dest_entry);
        }

        let file_id = self.resolve_file_id(source).await?;
        let parent_id = self.parent_id_for(dest).await?;
        let name = dest.name().unwrap_or_default().to_string();
        let token = self.access_token().await?;

        #[derive(Serialize)]
        struct CopyMetadata {
            name: String,
            parents: Vec<String>,
        }
        let response = self
            .http
            .post(format!("{DRIVE_API_URL}/files/{file_id}/copy"))
            .bearer_auth(token)
            .json(&CopyMetadata { name, parents: vec![parent_id] })
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        let file: DriveFile = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        Ok(file.to_entry(&self.id, dest.clone()))
    }

    async fn get_space_info(&self, _ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{DRIVE_API_URL}/about"))
            .bearer_auth(token)
            .query(&[("fields", "storageQuota")])
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct About {
            storage_quota: StorageQuota,
        }
        #[derive(Deserialize)]
        struct StorageQuota {
            limit: Option<String>,
            usage: Option<String>,
        }
        let about: About = response.json().await.map_err(|e| CfkError::driver("gdrive", e.to_string()))?;
        let total = about.storage_quota.limit.and_then(|s| s.parse().ok());
        let used = about.storage_quota.usage.and_then(|s| s.parse().ok());
        let available = match (total, used) {
            (Some(t), Some(u)) => Some(t.saturating_sub(u)),
            _ => None,
        };
        Ok(SpaceInfo { total, used, available })
    }

    async fn generate_proxy_url(&self, path: &VirtualPath, _options: &LinkOptions, _ctx: &DriverContext) -> CfkResult<LinkOutcome> {
        Ok(LinkOutcome::proxy(format!("/api/proxy{}", path.to_path_string())))
    }

    async fn multipart_init(&self, path: &VirtualPath, init: &UploadSessionInit, _ctx: &DriverContext) -> CfkResult<UploadSession> {
        let parent_id = self.parent_id_for(path).await?;
        let token = self.access_token().await?;

        #[derive(Serialize)]
        struct NewFileMetadata {
            name: String,
            parents: Vec<String>,
        }
        let response = self
            .http
            .post(format!("{DRIVE_UPLOAD_URL}/files?uploadType=resumable"))
            .bearer_auth(token)
            .header("X-Upload-Content-Type", init.mime_type.clone().unwrap_or_else(|| "application/octet-stream".to_string()))
            .header("X-Upload-Content-Length", init.file_size.to_string())
            .json(&NewFileMetadata { name: init.file_name.clone(), parents: vec![parent_id] })
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        if !response.status().is_success() {
            return Err(CfkError::driver("gdrive", format!("resumable session init failed: {}", response.status())));
        }
        let upload_url = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CfkError::driver("gdrive", "missing resumable session URL"))?
            .to_string();

        let part_size = init.part_size.unwrap_or(8 * 1024 * 1024);
        let now = Utc::now();
        Ok(UploadSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_ref: init.user_ref.clone(),
            user_kind: init.user_kind.clone(),
            storage_type: "gdrive".to_string(),
            storage_config_id: self.id.clone(),
            mount_id: self.id.clone(),
            fs_path: path.to_path_string(),
            file_name: init.file_name.clone(),
            file_size: init.file_size,
            mime_type: init.mime_type.clone(),
            fingerprint: init.fingerprint.clone(),
            strategy: UploadStrategy::GoogleDriveResumable,
            part_size,
            total_parts: UploadSession::part_count_for(init.file_size, part_size),
            bytes_uploaded: 0,
            uploaded_parts: Vec::new(),
            next_expected_range: Some(format!("0-{}", init.file_size.saturating_sub(1))),
            provider_upload_id: None,
            provider_upload_url: Some(upload_url),
            provider_meta: serde_json::Value::Null,
            status: cfk_core::session::SessionStatus::Active,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn multipart_proxy_chunk(
        &self,
        session: &UploadSession,
        mut chunk: ByteStream,
        content_range: (u64, u64, u64),
        _ctx: &DriverContext,
    ) -> CfkResult<ChunkAck> {
        let (start, end, total) = content_range;
        let upload_url = session.provider_upload_url.as_deref().ok_or_else(|| CfkError::driver("gdrive", "missing upload URL"))?;

        let mut buf = Vec::new();
        while let Some(c) = chunk.next().await {
            buf.extend_from_slice(&c?);
        }

        let response = self
            .http
            .put(upload_url)
            .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
            .body(buf)
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        if response.status() == StatusCode::PERMANENT_REDIRECT || response.status().as_u16() == 308 {
            let next_range = response.headers().get(header::RANGE).and_then(|v| v.to_str().ok()).map(|s| s.trim_start_matches("bytes=").to_string());
            return Ok(ChunkAck { done: false, bytes_uploaded: end + 1, next_expected_range: next_range.or(Some(format!("{}-", end + 1))) });
        }
        if response.status().is_success() {
            return Ok(ChunkAck { done: true, bytes_uploaded: total, next_expected_range: None });
        }
        Err(CfkError::driver("gdrive", format!("chunk upload failed: {}", response.status())))
    }

    async fn multipart_probe(&self, session: &UploadSession, _ctx: &DriverContext) -> CfkResult<PartsStatus> {
        let Some(upload_url) = &session.provider_upload_url else {
            return Ok(PartsStatus { bytes_uploaded: 0, completed_parts: Vec::new(), next_expected_ranges: Vec::new(), expired: true });
        };

        let response = self
            .http
            .put(upload_url)
            .header(header::CONTENT_RANGE, format!("bytes */{}", session.file_size))
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| CfkError::driver("gdrive", e.to_string()))?;

        if response.status().as_u16() == 308 {
            let range = response.headers().get(header::RANGE).and_then(|v| v.to_str().ok()).map(|s| s.to_string());
            let bytes_uploaded = range
                .as_deref()
                .and_then(|r| r.trim_start_matches("bytes=0-").parse::<u64>().ok())
                .map(|end| end + 1)
                .unwrap_or(session.bytes_uploaded);
            return Ok(PartsStatus { bytes_uploaded, completed_parts: Vec::new(), next_expected_ranges: range.into_iter().collect(), expired: false });
        }
        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::GONE {
            return Ok(PartsStatus { bytes_uploaded: 0, completed_parts: Vec::new(), next_expected_ranges: Vec::new(), expired: true });
        }
        Ok(PartsStatus { bytes_uploaded: session.file_size, completed_parts: Vec::new(), next_expected_ranges: Vec::new(), expired: false })
    }

    async fn multipart_complete(&self, session: &UploadSession, _part_etags: &[(u32, String)], _ctx: &DriverContext) -> CfkResult<FileEntry> {
        self.invalidate(&VirtualPath::new(&session.fs_path)).await;
        self.stat(&VirtualPath::new(&session.fs_path), &DriverContext::background()).await
    }

    async fn multipart_abort(&self, session: &UploadSession, _ctx: &DriverContext) -> CfkResult<()> {
        if let Some(upload_url) = &session.provider_upload_url {
            let _ = self.http.delete(upload_url).send().await;
        }
        Ok(())
    }
}

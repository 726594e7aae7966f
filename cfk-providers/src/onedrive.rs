//! OneDrive storage driver.
//!
//! Microsoft Graph API for OneDrive Personal and Business. Unlike Google
//! Drive, Graph addresses items directly by path (`root:/a/b.txt:`), so
//! there is no file-ID walker here.

use async_trait::async_trait;
use bytes::Bytes;
use cfk_core::{
    backend::{ByteStream, DriverCapabilities, DriverContext, SpaceInfo, StorageDriver},
    entry::{DirectoryListing, FileEntry},
    error::{CfkError, CfkResult},
    operations::*,
    session::{ChunkAck, PartsStatus, UploadSession, UploadSessionInit, UploadStrategy},
    VirtualPath,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const MS_AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MS_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneDriveTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneDriveConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub business: bool,
}

pub struct OneDriveDriver {
    id: String,
    config: OneDriveConfig,
    tokens: Arc<RwLock<Option<OneDriveTokens>>>,
    http: Client,
}

impl OneDriveDriver {
    pub fn new(id: impl Into<String>, config: OneDriveConfig) -> Self {
        Self { id: id.into(), config, tokens: Arc::new(RwLock::new(None)), http: Client::new() }
    }

    pub fn start_auth(&self) -> (String, PkceCodeVerifier) {
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(MS_AUTH_URL.to_string()).unwrap())
            .set_token_uri(TokenUrl::new(MS_TOKEN_URL.to_string()).unwrap())
            .set_redirect_uri(RedirectUrl::new(self.config.redirect_uri.clone()).unwrap());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("Files.ReadWrite.All".to_string()))
            .add_scope(Scope::new("offline_access".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        (auth_url.to_string(), pkce_verifier)
    }

    pub async fn complete_auth(&self, code: &str, verifier: PkceCodeVerifier) -> CfkResult<OneDriveTokens> {
        let params = [
            ("code", code.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("code_verifier", verifier.secret().to_string()),
        ];

        let response = self.http.post(MS_TOKEN_URL).form(&params).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
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
        let resp: TokenResp = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        let tokens = OneDriveTokens {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: resp.expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };
        *self.tokens.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    pub async fn set_tokens(&self, tokens: OneDriveTokens) {
        *self.tokens.write().await = Some(tokens);
    }

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

        let refresh_token = self.tokens.read().await.as_ref().and_then(|t| t.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            return Err(CfkError::Unauthorized("no refresh token available".into()));
        };

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(MS_AUTH_URL.to_string()).unwrap())
            .set_token_uri(TokenUrl::new(MS_TOKEN_URL.to_string()).unwrap())
            .set_redirect_uri(RedirectUrl::new(self.config.redirect_uri.clone()).unwrap());

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| CfkError::Unauthorized(format!("refresh failed: {e}")))?;

        let access_token = response.access_token().secret().clone();
        let expires_at = response.expires_in().map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64));
        *self.tokens.write().await = Some(OneDriveTokens { access_token: access_token.clone(), refresh_token: Some(refresh_token), expires_at });
        Ok(access_token)
    }

    /// Graph addresses items by path below `root:`.
    fn item_path(&self, path: &VirtualPath) -> String {
        if path.is_root() {
            format!("{GRAPH_API_URL}/me/drive/root")
        } else {
            format!("{GRAPH_API_URL}/me/drive/root:/{}", path.segments().join("/"))
        }
    }

    fn children_path(&self, path: &VirtualPath) -> String {
        if path.is_root() {
            format!("{GRAPH_API_URL}/me/drive/root/children")
        } else {
            format!("{GRAPH_API_URL}/me/drive/root:/{}:/children", path.segments().join("/"))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    #[serde(default)]
    name: String,
    size: Option<u64>,
    last_modified_date_time: Option<String>,
    folder: Option<serde_json::Value>,
    file: Option<FileFacet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    mime_type: Option<String>,
    hashes: Option<FileHashes>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileHashes {
    sha1_hash: Option<String>,
    sha256_hash: Option<String>,
}

impl DriveItem {
    fn to_entry(&self, mount_id: &str, path: VirtualPath) -> FileEntry {
        let mut entry = if self.folder.is_some() {
            FileEntry::directory(path, mount_id, "onedrive")
        } else {
            FileEntry::file(path, self.size.unwrap_or(0), mount_id, "onedrive")
        };
        if let Some(file) = &self.file {
            entry.mimetype = file.mime_type.clone();
            entry.etag = file.hashes.as_ref().and_then(|h| h.sha256_hash.clone().or_else(|| h.sha1_hash.clone()));
        }
        if let Some(modified) = &self.last_modified_date_time {
            if let Ok(dt) = DateTime::parse_from_rfc3339(modified) {
                entry = entry.with_modified(dt.with_timezone(&Utc));
            }
        }
        entry
    }
}

#[async_trait]
impl StorageDriver for OneDriveDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        if self.config.business {
            "OneDrive for Business"
        } else {
            "OneDrive"
        }
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities { presigned: false, ..DriverCapabilities::full_proxied() }
    }

    async fn is_available(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    async fn stat(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        let token = self.access_token().await?;
        let response = self.http.get(self.item_path(path)).bearer_auth(token).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CfkError::NotFound(path.to_path_string()));
        }
        if !response.status().is_success() {
            return Err(CfkError::driver("onedrive", format!("get item failed: {}", response.status())));
        }
        let item: DriveItem = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        Ok(item.to_entry(&self.id, path.clone()))
    }

    async fn exists(&self, path: &VirtualPath, ctx: &DriverContext) -> CfkResult<bool> {
        match self.stat(path, ctx).await {
            Ok(_) => Ok(true),
            Err(CfkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &VirtualPath, _options: &ListOptions, _ctx: &DriverContext) -> CfkResult<DirectoryListing> {
        let mut entries = Vec::new();
        let mut next_link = Some(self.children_path(path));

        while let Some(url) = next_link.take() {
            let token = self.access_token().await?;
            let response = self.http.get(&url).bearer_auth(token).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

            #[derive(Deserialize)]
            struct ItemList {
                value: Vec<DriveItem>,
                #[serde(rename = "@odata.nextLink")]
                next_link: Option<String>,
            }
            let list: ItemList = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
            for item in &list.value {
                entries.push(item.to_entry(&self.id, path.join(&item.name)));
            }
            next_link = list.next_link;
        }

        Ok(DirectoryListing::new(path.clone(), entries))
    }

    async fn download(&self, path: &VirtualPath, options: &ReadOptions, _ctx: &DriverContext) -> CfkResult<ByteStream> {
        let token = self.access_token().await?;
        let url = format!("{}:/content", self.item_path(path));
        let mut request = self.http.get(&url).bearer_auth(token);
        if let Some((start, end)) = options.range {
            request = request.header(header::RANGE, format!("bytes={start}-{end}"));
        }

        let response = request.send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(CfkError::driver("onedrive", format!("download failed: {}", response.status())));
        }
        let stream = response.bytes_stream().map(|r| r.map_err(|e| CfkError::driver("onedrive", e.to_string())));
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
        let url = format!("{}:/content", self.item_path(path));
        let response = self
            .http
            .put(&url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(buf)
            .send()
            .await
            .map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        if !response.status().is_success() {
            return Err(CfkError::driver("onedrive", format!("put content failed: {}", response.status())));
        }
        let item: DriveItem = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        let _ = ctx;
        Ok(item.to_entry(&self.id, path.clone()))
    }

    async fn mkdir(&self, path: &VirtualPath, _ctx: &DriverContext) -> CfkResult<FileEntry> {
        let parent = path.parent().unwrap_or_else(VirtualPath::root);
        let name = path.name().unwrap_or_default().to_string();
        let token = self.access_token().await?;

        #[derive(Serialize)]
        struct CreateFolder {
            name: String,
            folder: serde_json::Value,
            #[serde(rename = "@microsoft.graph.conflictBehavior")]
            conflict_behavior: String,
        }
        let response = self
            .http
            .post(self.children_path(&parent))
            .bearer_auth(token)
            .json(&CreateFolder { name, folder: serde_json::json!({}), conflict_behavior: "fail".to_string() })
            .send()
            .await
            .map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        let item: DriveItem = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        Ok(item.to_entry(&self.id, path.clone()))
    }

    async fn remove(&self, path: &VirtualPath, options: &DeleteOptions, _ctx: &DriverContext) -> CfkResult<()> {
        let token = self.access_token().await?;
        let response = self.http.delete(self.item_path(path)).bearer_auth(token).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            if options.force {
                return Ok(());
            }
            return Err(CfkError::NotFound(path.to_path_string()));
        }
        if !response.status().is_success() && response.status() != StatusCode::NO_CONTENT {
            return Err(CfkError::driver("onedrive", format!("delete failed: {}", response.status())));
        }
        Ok(())
    }

    async fn rename(&self, source: &VirtualPath, dest: &VirtualPath, _options: &MoveOptions, ctx: &DriverContext) -> CfkResult<FileEntry> {
        let name = dest.name().unwrap_or_default().to_string();
        let token = self.access_token().await?;

        #[derive(Serialize)]
        struct RenameRequest {
            name: String,
        }
        let response = self
            .http
            .patch(self.item_path(source))
            .bearer_auth(token)
            .json(&RenameRequest { name })
            .send()
            .await
            .map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        let item: DriveItem = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        let _ = ctx;
        Ok(item.to_entry(&self.id, dest.clone()))
    }

    async fn copy(&self, source: &VirtualPath, dest: &VirtualPath, options: &CopyOptions, ctx: &DriverContext) -> CfkResult<FileEntry> {
        if options.skip_existing && self.exists(dest, ctx).await? {
            return self.stat(dest, ctx).await;
        }

        let dest_parent = dest.parent().unwrap_or_else(VirtualPath::root);
        let dest_name = dest.name().unwrap_or_default().to_string();
        let token = self.access_token().await?;

        let parent_item: DriveItem =
            self.http.get(self.item_path(&dest_parent)).bearer_auth(token.clone()).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct CopyRequest {
            parent_reference: ParentRef,
            name: String,
        }
        #[derive(Serialize)]
        struct ParentRef {
            path: String,
        }

        let response = self
            .http
            .post(format!("{}:/copy", self.item_path(source)))
            .bearer_auth(token)
            .json(&CopyRequest { parent_reference: ParentRef { path: format!("/drive/root:{}", dest_parent.to_path_string()) }, name: dest_name })
            .send()
            .await
            .map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::ACCEPTED {
            return Err(CfkError::driver("onedrive", format!("copy failed: {}", response.status())));
        }
        let _ = parent_item;
        // OneDrive copy is asynchronous server-side; poll via stat since we
        // don't track the monitor URL here.
        self.stat(dest, ctx).await
    }

    async fn get_space_info(&self, _ctx: &DriverContext) -> CfkResult<SpaceInfo> {
        let token = self.access_token().await?;
        let response = self.http.get(format!("{GRAPH_API_URL}/me/drive")).bearer_auth(token).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        #[derive(Deserialize)]
        struct Drive {
            quota: Option<DriveQuota>,
        }
        #[derive(Deserialize)]
        struct DriveQuota {
            total: Option<u64>,
            used: Option<u64>,
            remaining: Option<u64>,
        }
        let drive: Drive = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        let quota = drive.quota.unwrap_or(DriveQuota { total: None, used: None, remaining: None });
        Ok(SpaceInfo { total: quota.total, used: quota.used, available: quota.remaining })
    }

    async fn multipart_init(&self, path: &VirtualPath, init: &UploadSessionInit, _ctx: &DriverContext) -> CfkResult<UploadSession> {
        let token = self.access_token().await?;
        let url = format!("{}:/createUploadSession", self.item_path(path));

        #[derive(Serialize)]
        struct UploadSessionRequest {
            item: serde_json::Value,
        }
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&UploadSessionRequest { item: serde_json::json!({ "@microsoft.graph.conflictBehavior": "replace" }) })
            .send()
            .await
            .map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        if !response.status().is_success() {
            return Err(CfkError::driver("onedrive", format!("create upload session failed: {}", response.status())));
        }

        #[derive(Deserialize)]
        struct SessionResp {
            #[serde(rename = "uploadUrl")]
            upload_url: String,
        }
        let resp: SessionResp = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        let part_size = init.part_size.unwrap_or(10 * 320 * 1024); // multiple of 320 KiB, per Graph's requirement
        let now = Utc::now();
        Ok(UploadSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_ref: init.user_ref.clone(),
            user_kind: init.user_kind.clone(),
            storage_type: "onedrive".to_string(),
            storage_config_id: self.id.clone(),
            mount_id: self.id.clone(),
            fs_path: path.to_path_string(),
            file_name: init.file_name.clone(),
            file_size: init.file_size,
            mime_type: init.mime_type.clone(),
            fingerprint: init.fingerprint.clone(),
            strategy: UploadStrategy::OneDriveResumable,
            part_size,
            total_parts: UploadSession::part_count_for(init.file_size, part_size),
            bytes_uploaded: 0,
            uploaded_parts: Vec::new(),
            next_expected_range: Some(format!("0-{}", init.file_size.saturating_sub(1))),
            provider_upload_id: None,
            provider_upload_url: Some(resp.upload_url),
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
        let upload_url = session.provider_upload_url.as_deref().ok_or_else(|| CfkError::driver("onedrive", "missing upload URL"))?;

        let mut buf = Vec::new();
        while let Some(c) = chunk.next().await {
            buf.extend_from_slice(&c?);
        }

        let response = self
            .http
            .put(upload_url)
            .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
            .header(header::CONTENT_LENGTH, buf.len().to_string())
            .body(buf)
            .send()
            .await
            .map_err(|e| CfkError::driver("onedrive", e.to_string()))?;

        if response.status().is_success() {
            return Ok(ChunkAck { done: true, bytes_uploaded: total, next_expected_range: None });
        }

        #[derive(Deserialize)]
        struct RangeResp {
            #[serde(rename = "nextExpectedRanges")]
            next_expected_ranges: Vec<String>,
        }
        let parsed: Option<RangeResp> = response.json().await.ok();
        let next = parsed.and_then(|r| r.next_expected_ranges.into_iter().next());
        Ok(ChunkAck { done: false, bytes_uploaded: end + 1, next_expected_range: next.or(Some(format!("{}-", end + 1))) })
    }

    async fn multipart_probe(&self, session: &UploadSession, _ctx: &DriverContext) -> CfkResult<PartsStatus> {
        let Some(upload_url) = &session.provider_upload_url else {
            return Ok(PartsStatus { bytes_uploaded: 0, completed_parts: Vec::new(), next_expected_ranges: Vec::new(), expired: true });
        };

        let response = self.http.get(upload_url).send().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(PartsStatus { bytes_uploaded: 0, completed_parts: Vec::new(), next_expected_ranges: Vec::new(), expired: true });
        }

        #[derive(Deserialize)]
        struct RangeResp {
            #[serde(rename = "nextExpectedRanges")]
            next_expected_ranges: Vec<String>,
        }
        let parsed: RangeResp = response.json().await.map_err(|e| CfkError::driver("onedrive", e.to_string()))?;
        let bytes_uploaded = parsed
            .next_expected_ranges
            .first()
            .and_then(|r| r.split('-').next())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(session.bytes_uploaded);

        Ok(PartsStatus { bytes_uploaded, completed_parts: Vec::new(), next_expected_ranges: parsed.next_expected_ranges, expired: false })
    }

    async fn multipart_complete(&self, session: &UploadSession, _part_etags: &[(u32, String)], _ctx: &DriverContext) -> CfkResult<FileEntry> {
        self.stat(&VirtualPath::new(&session.fs_path), &DriverContext::background()).await
    }

    async fn multipart_abort(&self, session: &UploadSession, _ctx: &DriverContext) -> CfkResult<()> {
        if let Some(upload_url) = &session.provider_upload_url {
            let _ = self.http.delete(upload_url).send().await;
        }
        Ok(())
    }
}

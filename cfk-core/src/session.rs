//! Resumable multipart upload session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chosen upload strategy for a session, decided at init time from the
/// owning driver's capabilities and the requested file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    SingleSession,
    S3Multipart,
    GoogleDriveResumable,
    OneDriveResumable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Aborted,
    Error,
}

impl SessionStatus {
    /// Terminal statuses are absorbing: once reached, no further
    /// transition is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted | SessionStatus::Error)
    }
}

/// Caller-supplied parameters to start a session.
#[derive(Debug, Clone)]
pub struct UploadSessionInit {
    pub user_ref: Option<String>,
    pub user_kind: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
    pub part_size: Option<u64>,
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub algo: String,
    pub value: String,
}

/// Persistent per-upload record. Owned by the multipart session manager in
/// `cfk-cache`; drivers only ever see the fields they need via the
/// `StorageDriver::multipart_*` entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: String,
    pub user_ref: Option<String>,
    pub user_kind: Option<String>,
    pub storage_type: String,
    pub storage_config_id: String,
    pub mount_id: String,
    pub fs_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub strategy: UploadStrategy,
    pub part_size: u64,
    pub total_parts: u32,
    pub bytes_uploaded: u64,
    pub uploaded_parts: Vec<UploadedPart>,
    pub next_expected_range: Option<String>,
    pub provider_upload_id: Option<String>,
    pub provider_upload_url: Option<String>,
    pub provider_meta: serde_json::Value,
    pub status: SessionStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// `totalParts * partSize >= fileSize` and `(totalParts-1) * partSize < fileSize`.
    pub fn part_count_for(file_size: u64, part_size: u64) -> u32 {
        if part_size == 0 {
            return 1;
        }
        (file_size.div_ceil(part_size)).max(1) as u32
    }

    pub fn completed_parts(&self) -> u32 {
        if self.part_size == 0 {
            return 0;
        }
        (self.bytes_uploaded / self.part_size) as u32
    }

    /// Apply a new `bytes_uploaded` reading from the provider, rejecting
    /// any regression (monotonicity invariant) while `active`.
    pub fn advance(&mut self, bytes_uploaded: u64) {
        if self.status == SessionStatus::Active && bytes_uploaded > self.bytes_uploaded {
            self.bytes_uploaded = bytes_uploaded;
        }
    }

    pub fn transition(&mut self, to: SessionStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = to;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedPart {
    pub part_number: u32,
    pub size: u64,
    pub etag: Option<String>,
}

/// Result of proxying one chunk to the provider.
#[derive(Debug, Clone)]
pub struct ChunkAck {
    pub done: bool,
    pub bytes_uploaded: u64,
    pub next_expected_range: Option<String>,
}

/// Result of reconciling local session state against the provider's
/// authoritative progress (list-parts / refresh).
#[derive(Debug, Clone)]
pub struct PartsStatus {
    pub bytes_uploaded: u64,
    pub completed_parts: Vec<UploadedPart>,
    pub next_expected_ranges: Vec<String>,
    pub expired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_count_matches_invariant() {
        let file_size = 700_000u64;
        let part_size = 524_288u64;
        let parts = UploadSession::part_count_for(file_size, part_size);
        assert!(parts as u64 * part_size >= file_size);
        assert!((parts - 1) as u64 * part_size < file_size);
        assert_eq!(parts, 2);
    }

    #[test]
    fn terminal_status_is_absorbing() {
        let mut s = sample_session();
        s.transition(SessionStatus::Completed);
        s.transition(SessionStatus::Aborted);
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn advance_never_regresses_while_active() {
        let mut s = sample_session();
        s.advance(100);
        s.advance(50);
        assert_eq!(s.bytes_uploaded, 100);
    }

    fn sample_session() -> UploadSession {
        UploadSession {
            id: "u1".into(),
            user_ref: None,
            user_kind: None,
            storage_type: "s3".into(),
            storage_config_id: "cfg".into(),
            mount_id: "m".into(),
            fs_path: "/x.bin".into(),
            file_name: "x.bin".into(),
            file_size: 700_000,
            mime_type: None,
            fingerprint: None,
            strategy: UploadStrategy::S3Multipart,
            part_size: 524_288,
            total_parts: 2,
            bytes_uploaded: 0,
            uploaded_parts: Vec::new(),
            next_expected_range: None,
            provider_upload_id: None,
            provider_upload_url: None,
            provider_meta: serde_json::Value::Null,
            status: SessionStatus::Active,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

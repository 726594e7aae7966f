//! Resumable multipart upload session table.
//!
//! Pure persistence: initialize/load/update/list rows and answer the
//! fingerprint-based "is there already a session for this exact upload"
//! lookup. The orchestration that calls into a driver's `multipart_*`
//! entry points and decides what to write back lives in the facade
//! (`cfk-mount`); this store only guarantees the row survives a restart
//! and that the fingerprint index stays consistent with it.

use cfk_core::session::{Fingerprint, UploadSession};
use std::path::Path;

use crate::{sled_backend::SledBackend, CacheError, CacheResult};

fn session_key(id: &str) -> Vec<u8> {
    format!("session:{id}").into_bytes()
}

fn fingerprint_key(
    user_ref: Option<&str>,
    user_kind: Option<&str>,
    storage_config_id: &str,
    fs_path: &str,
    file_name: &str,
    file_size: u64,
    fingerprint: &Fingerprint,
) -> Vec<u8> {
    format!(
        "fingerprint:{}:{}:{}:{}:{}:{}:{}:{}",
        user_ref.unwrap_or(""),
        user_kind.unwrap_or(""),
        storage_config_id,
        fs_path,
        file_name,
        file_size,
        fingerprint.algo,
        fingerprint.value,
    )
    .into_bytes()
}

pub struct UploadSessionStore {
    db: SledBackend,
}

impl UploadSessionStore {
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        Ok(Self { db: SledBackend::open(path)? })
    }

    pub fn insert(&self, session: &UploadSession) -> CacheResult<()> {
        let value = serde_json::to_vec(session).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.db.insert(&session_key(&session.id), &value)?;

        if let Some(fp) = &session.fingerprint {
            let key = fingerprint_key(
                session.user_ref.as_deref(),
                session.user_kind.as_deref(),
                &session.storage_config_id,
                &session.fs_path,
                &session.file_name,
                session.file_size,
                fp,
            );
            self.db.insert(&key, session.id.as_bytes())?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> CacheResult<Option<UploadSession>> {
        match self.db.get(&session_key(id))? {
            Some(bytes) => {
                let session = serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    pub fn get_or_err(&self, id: &str) -> CacheResult<UploadSession> {
        self.get(id)?.ok_or_else(|| CacheError::NotFound(format!("upload session {id}")))
    }

    /// Replace the stored row. Callers mutate an `UploadSession` in place
    /// (via `advance`/`transition`) and save it back through this method.
    pub fn save(&self, session: &UploadSession) -> CacheResult<()> {
        let value = serde_json::to_vec(session).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.db.insert(&session_key(&session.id), &value)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn find_by_fingerprint(
        &self,
        user_ref: Option<&str>,
        user_kind: Option<&str>,
        storage_config_id: &str,
        fs_path: &str,
        file_name: &str,
        file_size: u64,
        fingerprint: &Fingerprint,
    ) -> CacheResult<Option<UploadSession>> {
        let key = fingerprint_key(user_ref, user_kind, storage_config_id, fs_path, file_name, file_size, fingerprint);
        let Some(id_bytes) = self.db.get(&key)? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id_bytes).to_string();
        match self.get(&id)? {
            // A terminal session is not resumable; treat it as a miss so
            // the caller starts a fresh one.
            Some(session) if !session.status.is_terminal() => Ok(Some(session)),
            _ => Ok(None),
        }
    }

    /// All active sessions whose `fs_path` starts with `prefix`, for the
    /// `multipart/list` endpoint.
    pub fn list_active_under(&self, prefix: &str) -> CacheResult<Vec<UploadSession>> {
        let mut sessions = Vec::new();
        for entry in self.db.scan_prefix(b"session:") {
            let (_, value) = entry?;
            let session: UploadSession = serde_json::from_slice(&value).map_err(|e| CacheError::Serialization(e.to_string()))?;
            if !session.status.is_terminal() && session.fs_path.starts_with(prefix) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    pub fn delete(&self, id: &str) -> CacheResult<()> {
        self.db.remove(&session_key(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfk_core::session::{SessionStatus, UploadStrategy};
    use chrono::Utc;

    fn sample(id: &str) -> UploadSession {
        UploadSession {
            id: id.into(),
            user_ref: Some("u1".into()),
            user_kind: Some("member".into()),
            storage_type: "s3".into(),
            storage_config_id: "cfg1".into(),
            mount_id: "m1".into(),
            fs_path: "/uploads/x.bin".into(),
            file_name: "x.bin".into(),
            file_size: 1_000_000,
            mime_type: None,
            fingerprint: Some(Fingerprint { algo: "sha256".into(), value: "deadbeef".into() }),
            strategy: UploadStrategy::S3Multipart,
            part_size: 500_000,
            total_parts: 2,
            bytes_uploaded: 0,
            uploaded_parts: Vec::new(),
            next_expected_range: None,
            provider_upload_id: Some("upload-1".into()),
            provider_upload_url: None,
            provider_meta: serde_json::Value::Null,
            status: SessionStatus::Active,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::open(dir.path()).unwrap();
        store.insert(&sample("s1")).unwrap();
        let loaded = store.get("s1").unwrap().unwrap();
        assert_eq!(loaded.file_name, "x.bin");
    }

    #[test]
    fn fingerprint_lookup_finds_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::open(dir.path()).unwrap();
        let session = sample("s2");
        store.insert(&session).unwrap();

        let found = store
            .find_by_fingerprint(
                Some("u1"),
                Some("member"),
                "cfg1",
                "/uploads/x.bin",
                "x.bin",
                1_000_000,
                &Fingerprint { algo: "sha256".into(), value: "deadbeef".into() },
            )
            .unwrap();
        assert_eq!(found.unwrap().id, "s2");
    }

    #[test]
    fn completed_session_is_not_returned_by_fingerprint_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::open(dir.path()).unwrap();
        let mut session = sample("s3");
        session.status = SessionStatus::Completed;
        store.insert(&session).unwrap();

        let found = store
            .find_by_fingerprint(
                Some("u1"),
                Some("member"),
                "cfg1",
                "/uploads/x.bin",
                "x.bin",
                1_000_000,
                &Fingerprint { algo: "sha256".into(), value: "deadbeef".into() },
            )
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn list_active_under_prefix_excludes_terminal_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadSessionStore::open(dir.path()).unwrap();
        store.insert(&sample("s4")).unwrap();
        let mut done = sample("s5");
        done.status = SessionStatus::Completed;
        store.insert(&done).unwrap();

        let active = store.list_active_under("/uploads").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "s4");
    }
}

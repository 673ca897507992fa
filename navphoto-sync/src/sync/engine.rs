use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gate::UploadGate;
use super::status::{ProgressSnapshot, StatusStore, StatusTracker, SyncProgress};
use crate::model::{LocalId, LocalPhoto, NewPhoto, SyncStatus, fingerprint};
use crate::stores::{BlobError, BlobStore, LocalStore, LocalStoreError, RemoteError, RemoteStore};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("image data unavailable at {path}")]
    DataUnavailable { path: String },
    #[error("remote record {remote_id} holds an undecodable image: {source}")]
    CorruptPayload {
        remote_id: String,
        #[source]
        source: image::ImageError,
    },
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("local store write failed: {0}")]
    PersistenceFailure(#[from] LocalStoreError),
    #[error("remote store error: {0}")]
    Remote(String),
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable(message) => SyncError::RemoteUnavailable(message),
            RemoteError::Store(message) => SyncError::Remote(message),
        }
    }
}

impl SyncError {
    /// Problems with one item's own data; a batch skips the item.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SyncError::DataUnavailable { .. } | SyncError::CorruptPayload { .. }
        )
    }
}

/// Aggregate counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Rows that matched an existing record by back-ref or heuristic and got
    /// its remote id recorded.
    pub linked: usize,
    /// Local rows removed by duplicate cleanup.
    pub collapsed: usize,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.uploaded
    }

    pub fn is_noop(&self) -> bool {
        *self == SyncReport::default()
    }

    pub(crate) fn record_error(&mut self, err: &SyncError) {
        if err.is_skip() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(SyncReport),
    /// The same pass was already in flight; nothing was done.
    AlreadyRunning,
}

impl PassOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            PassOutcome::AlreadyRunning => None,
        }
    }
}

/// Keeps local photos and the remote record store in step.
pub struct SyncEngine {
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) local: Arc<dyn LocalStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) status: Arc<dyn StatusStore>,
    pub(crate) gate: UploadGate,
    pub(crate) progress: SyncProgress,
    in_flight_owners: Mutex<HashSet<String>>,
}

impl SyncEngine {
    /// Uploads go through [`UploadGate::process_wide`], so every engine built
    /// here shares one upload slot.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            remote,
            local,
            blobs,
            status: Arc::new(StatusTracker::new()),
            gate: UploadGate::process_wide(),
            progress: SyncProgress::default(),
            in_flight_owners: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_status_store(mut self, status: Arc<dyn StatusStore>) -> Self {
        self.status = status;
        self
    }

    /// Replaces the process-wide gate, e.g. to isolate an engine in tests.
    pub fn with_upload_gate(mut self, gate: UploadGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn upload_gate(&self) -> &UploadGate {
        &self.gate
    }

    pub fn get_status(&self, id: LocalId) -> SyncStatus {
        self.status.get(id)
    }

    pub fn get_progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Stores a newly taken photo locally; it reaches the remote on the next pass.
    pub async fn capture_photo(
        &self,
        owner_key: &str,
        bytes: &[u8],
    ) -> Result<LocalPhoto, SyncError> {
        let photo = import_photo(
            self.local.as_ref(),
            self.blobs.as_ref(),
            owner_key,
            bytes,
            OffsetDateTime::now_utc(),
        )
        .await?;
        info!(owner_key, local_id = photo.id, file_name = %photo.file_name, "photo captured");
        Ok(photo)
    }

    pub async fn list_photos(
        &self,
        owner_key: &str,
    ) -> Result<Vec<(LocalPhoto, SyncStatus)>, SyncError> {
        let photos = self.local.list_by_owner(owner_key).await?;
        Ok(photos
            .into_iter()
            .map(|photo| {
                let status = self.status.get(photo.id);
                (photo, status)
            })
            .collect())
    }

    pub fn spawn_sync_owner(
        self: &Arc<Self>,
        owner_key: impl Into<String>,
    ) -> JoinHandle<Result<PassOutcome, SyncError>> {
        let engine = Arc::clone(self);
        let owner_key = owner_key.into();
        tokio::spawn(async move { engine.sync_owner(&owner_key).await })
    }

    pub fn spawn_sync_all(self: &Arc<Self>) -> JoinHandle<Result<PassOutcome, SyncError>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.sync_all().await })
    }

    pub(crate) fn claim_owner(&self, owner_key: &str) -> Option<OwnerClaim<'_>> {
        let mut owners = self
            .in_flight_owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !owners.insert(owner_key.to_string()) {
            debug!(owner_key, "reconciliation already running");
            return None;
        }
        Some(OwnerClaim {
            owners: &self.in_flight_owners,
            owner_key: owner_key.to_string(),
        })
    }
}

/// Marks an owner key as being reconciled until dropped.
pub(crate) struct OwnerClaim<'a> {
    owners: &'a Mutex<HashSet<String>>,
    owner_key: String,
}

impl Drop for OwnerClaim<'_> {
    fn drop(&mut self) {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.owner_key);
    }
}

/// Saves the bytes and inserts the row; the blob is removed again if the
/// insert fails.
pub async fn import_photo(
    local: &dyn LocalStore,
    blobs: &dyn BlobStore,
    owner_key: &str,
    bytes: &[u8],
    created_at: OffsetDateTime,
) -> Result<LocalPhoto, SyncError> {
    let saved = blobs.save(bytes, owner_key).await?;
    let input = NewPhoto {
        owner_key: owner_key.to_string(),
        file_name: saved.file_name,
        file_path: saved.path.clone(),
        created_at,
        remote_ref: None,
        fingerprint: Some(fingerprint(bytes)),
    };
    match local.insert(&input).await {
        Ok(photo) => Ok(photo),
        Err(err) => {
            if let Err(cleanup) = blobs.delete(&saved.path).await {
                warn!(path = %saved.path, error = %cleanup, "failed to remove orphaned blob");
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

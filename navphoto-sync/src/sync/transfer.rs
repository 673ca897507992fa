use tracing::{debug, info, warn};

use super::engine::{SyncEngine, SyncError};
use crate::model::{LocalPhoto, NewPhoto, NewRemoteRecord, RemoteRecord, SyncStatus, fingerprint};

impl SyncEngine {
    /// Pushes one local photo to the remote store and returns the new remote id.
    ///
    /// Holds the upload gate for the whole transfer. Nothing is retried here.
    pub async fn upload_one(&self, photo: &LocalPhoto) -> Result<String, SyncError> {
        let _permit = self.gate.acquire().await;
        self.status.set(photo.id, SyncStatus::Syncing);

        let result = self.push_photo(photo).await;
        match &result {
            Ok(remote_id) => {
                self.status.set(photo.id, SyncStatus::Synced);
                info!(
                    owner_key = %photo.owner_key,
                    local_id = photo.id,
                    remote_id = %remote_id,
                    "photo uploaded"
                );
            }
            Err(err) => {
                self.status.set(photo.id, SyncStatus::Failed);
                warn!(
                    owner_key = %photo.owner_key,
                    local_id = photo.id,
                    error = %err,
                    "photo upload failed"
                );
            }
        }
        result
    }

    async fn push_photo(&self, photo: &LocalPhoto) -> Result<String, SyncError> {
        let bytes = match self.blobs.load(&photo.file_path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(SyncError::DataUnavailable {
                    path: photo.file_path.clone(),
                });
            }
            Err(err) => {
                debug!(path = %photo.file_path, error = %err, "blob read failed");
                return Err(SyncError::DataUnavailable {
                    path: photo.file_path.clone(),
                });
            }
        };

        let record = NewRemoteRecord {
            owner_key: photo.owner_key.clone(),
            file_name: photo.file_name.clone(),
            created_at: photo.created_at,
            image_bytes: bytes,
            back_ref: Some(photo.id),
        };
        let remote_id = self.remote.put(&record).await?;

        // The photo is already safe on the remote; a missing back-reference is
        // recovered through the record's back_ref on the next pass.
        match self.local.update_remote_ref(photo.id, &remote_id).await {
            Ok(true) => {}
            Ok(false) => warn!(
                local_id = photo.id,
                remote_id = %remote_id,
                "remote ref not recorded: row missing or already linked"
            ),
            Err(err) => warn!(
                local_id = photo.id,
                remote_id = %remote_id,
                error = %err,
                "failed to persist remote ref"
            ),
        }
        Ok(remote_id)
    }

    /// Pulls one remote record into the blob store and the local store.
    pub async fn download_one(
        &self,
        record: &RemoteRecord,
        owner_key: &str,
    ) -> Result<LocalPhoto, SyncError> {
        image::load_from_memory(&record.image_bytes).map_err(|source| {
            SyncError::CorruptPayload {
                remote_id: record.remote_id.clone(),
                source,
            }
        })?;

        let saved = self.blobs.save(&record.image_bytes, owner_key).await?;
        let input = NewPhoto {
            owner_key: owner_key.to_string(),
            file_name: saved.file_name,
            file_path: saved.path.clone(),
            created_at: record.created_at,
            remote_ref: Some(record.remote_id.clone()),
            fingerprint: Some(fingerprint(&record.image_bytes)),
        };
        let photo = match self.local.insert(&input).await {
            Ok(photo) => photo,
            Err(err) => {
                if let Err(cleanup) = self.blobs.delete(&saved.path).await {
                    warn!(path = %saved.path, error = %cleanup, "failed to remove orphaned blob");
                }
                return Err(err.into());
            }
        };

        self.status.set(photo.id, SyncStatus::Synced);
        info!(
            owner_key,
            local_id = photo.id,
            remote_id = %record.remote_id,
            "photo downloaded"
        );
        Ok(photo)
    }
}

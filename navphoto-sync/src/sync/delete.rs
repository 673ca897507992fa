use tracing::{debug, info, warn};

use super::engine::{SyncEngine, SyncError};
use crate::model::LocalId;
use crate::stores::DeleteOutcome;

/// What happened to the remote copy during a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCleanup {
    Deleted,
    AlreadyGone,
    /// The photo never reached the remote.
    NotLinked,
    /// The remote delete failed; the local delete went ahead anyway.
    Failed(String),
}

impl SyncEngine {
    /// Deletes a photo from both stores.
    ///
    /// Remote cleanup is best effort. Errors deleting the row or the blob
    /// always reach the caller, even when the remote copy is already gone.
    pub async fn delete_by_local_id(&self, id: LocalId) -> Result<RemoteCleanup, SyncError> {
        let photo = self
            .local
            .get(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("local photo {id}")))?;

        let cleanup = match &photo.remote_ref {
            None => RemoteCleanup::NotLinked,
            Some(remote_id) => match self.remote.delete(remote_id).await {
                Ok(DeleteOutcome::Deleted) => RemoteCleanup::Deleted,
                Ok(DeleteOutcome::NotFound) => {
                    debug!(local_id = id, remote_id = %remote_id, "remote record already gone");
                    RemoteCleanup::AlreadyGone
                }
                Err(err) => {
                    warn!(local_id = id, remote_id = %remote_id, error = %err, "remote delete failed");
                    RemoteCleanup::Failed(err.to_string())
                }
            },
        };

        // Row before blob: a failure may orphan a file, never a row.
        if !self.local.delete(id).await? {
            debug!(local_id = id, "row removed concurrently");
        }
        self.status.clear(id);
        self.blobs.delete(&photo.file_path).await?;

        info!(local_id = id, owner_key = %photo.owner_key, remote = ?cleanup, "photo deleted");
        Ok(cleanup)
    }
}

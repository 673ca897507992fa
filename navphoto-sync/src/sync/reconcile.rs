use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::dedup::plan_collapse;
use super::engine::{PassOutcome, SyncEngine, SyncError, SyncReport};
use super::matcher::{MatchKind, find_remote_match, has_local_match};
use crate::model::{LocalPhoto, RemoteRecord, SyncStatus};

/// How one local photo stands against the remote records of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteMatch {
    Missing,
    Present,
    /// Matched by back-ref or heuristic and the remote id is now recorded.
    Linked,
}

impl SyncEngine {
    /// One reconciliation pass for `owner_key`: download what only the remote
    /// has, upload what only the local store has, then collapse local
    /// duplicates.
    ///
    /// A call for an owner that is already being reconciled returns
    /// [`PassOutcome::AlreadyRunning`] without touching either store.
    pub async fn sync_owner(&self, owner_key: &str) -> Result<PassOutcome, SyncError> {
        let Some(_claim) = self.claim_owner(owner_key) else {
            return Ok(PassOutcome::AlreadyRunning);
        };

        self.remote.ensure_available().await?;
        let remote = self.remote.query(owner_key).await?;
        let local = self.local.list_by_owner(owner_key).await?;
        info!(
            owner_key,
            remote = remote.len(),
            local = local.len(),
            "reconciliation started"
        );

        let mut report = SyncReport::default();

        for record in &remote {
            if has_local_match(record, &local) {
                continue;
            }
            match self.download_one(record, owner_key).await {
                Ok(_) => report.downloaded += 1,
                Err(err) => {
                    warn!(owner_key, remote_id = %record.remote_id, error = %err, "download skipped");
                    report.record_error(&err);
                }
            }
        }

        let local = self.local.list_by_owner(owner_key).await?;
        // Rows that cleanup will remove are not uploaded; kept rows already
        // carry any remote ref they adopt from a removed duplicate.
        let plan = plan_collapse(&local);
        for photo in &plan.kept {
            match self.link_remote_match(photo, &remote).await {
                RemoteMatch::Present => continue,
                RemoteMatch::Linked => {
                    report.linked += 1;
                    continue;
                }
                RemoteMatch::Missing => {}
            }
            match self.upload_one(photo).await {
                Ok(_) => report.uploaded += 1,
                Err(err) => report.record_error(&err),
            }
        }
        if !plan.removed.is_empty() {
            debug!(
                owner_key,
                pending = plan.removed.len(),
                "duplicates left out of upload"
            );
        }

        report.collapsed = self.collapse_duplicates(owner_key).await?;

        info!(
            owner_key,
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            skipped = report.skipped,
            failed = report.failed,
            linked = report.linked,
            collapsed = report.collapsed,
            "reconciliation finished"
        );
        Ok(PassOutcome::Completed(report))
    }

    /// Finds the remote counterpart of `photo` and, when the row has no
    /// remote ref yet, records the matched id on it.
    pub(crate) async fn link_remote_match(
        &self,
        photo: &LocalPhoto,
        remote: &[RemoteRecord],
    ) -> RemoteMatch {
        let Some((record, kind)) = find_remote_match(photo, remote) else {
            return RemoteMatch::Missing;
        };
        if kind == MatchKind::RemoteRef || photo.remote_ref.is_some() {
            return RemoteMatch::Present;
        }
        match self.local.update_remote_ref(photo.id, &record.remote_id).await {
            Ok(true) => {
                self.status.set(photo.id, SyncStatus::Synced);
                debug!(
                    local_id = photo.id,
                    remote_id = %record.remote_id,
                    kind = ?kind,
                    "linked existing remote record"
                );
                RemoteMatch::Linked
            }
            Ok(false) => RemoteMatch::Present,
            Err(err) => {
                warn!(
                    local_id = photo.id,
                    remote_id = %record.remote_id,
                    error = %err,
                    "failed to record remote ref"
                );
                RemoteMatch::Present
            }
        }
    }

    async fn collapse_duplicates(&self, owner_key: &str) -> Result<usize, SyncError> {
        let removed = self.local.collapse_duplicates(owner_key).await?;
        if removed.is_empty() {
            return Ok(0);
        }

        let survivors = self.local.list_by_owner(owner_key).await?;
        let live_paths: HashSet<&str> = survivors.iter().map(|p| p.file_path.as_str()).collect();
        for photo in &removed {
            self.status.clear(photo.id);
            self.discard_blob(photo, &live_paths).await;
        }
        info!(owner_key, removed = removed.len(), "local duplicates collapsed");
        Ok(removed.len())
    }

    async fn discard_blob(&self, photo: &LocalPhoto, live_paths: &HashSet<&str>) {
        if live_paths.contains(photo.file_path.as_str()) {
            return;
        }
        if let Err(err) = self.blobs.delete(&photo.file_path).await {
            warn!(local_id = photo.id, path = %photo.file_path, error = %err, "failed to delete duplicate blob");
        }
    }
}

use tracing::{debug, info};

use super::engine::{PassOutcome, SyncEngine, SyncError, SyncReport};
use super::reconcile::RemoteMatch;
use super::status::SyncProgress;

struct ProgressRun<'a>(&'a SyncProgress);

impl Drop for ProgressRun<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl SyncEngine {
    /// Upload-only sweep over every local photo against every remote record.
    ///
    /// Downloads are left to [`SyncEngine::sync_owner`]. Progress is published
    /// through [`SyncEngine::get_progress`] after each photo.
    pub async fn sync_all(&self) -> Result<PassOutcome, SyncError> {
        if !self.progress.try_start() {
            debug!("bulk sync already running");
            return Ok(PassOutcome::AlreadyRunning);
        }
        let _run = ProgressRun(&self.progress);

        self.remote.ensure_available().await?;
        let local = self.local.list_all().await?;
        let remote = self.remote.query_all().await?;
        self.progress.set_total(local.len());
        info!(
            local = local.len(),
            remote = remote.len(),
            "bulk sync started"
        );

        let mut report = SyncReport::default();
        for photo in &local {
            match self.link_remote_match(photo, &remote).await {
                RemoteMatch::Present => {}
                RemoteMatch::Linked => report.linked += 1,
                RemoteMatch::Missing => match self.upload_one(photo).await {
                    Ok(_) => report.uploaded += 1,
                    Err(err) => report.record_error(&err),
                },
            }
            self.progress.advance();
        }

        info!(
            uploaded = report.uploaded,
            linked = report.linked,
            skipped = report.skipped,
            failed = report.failed,
            "bulk sync finished"
        );
        Ok(PassOutcome::Completed(report))
    }
}

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use time::OffsetDateTime;

use super::engine::SyncEngine;
use super::gate::UploadGate;
use crate::model::{LocalId, LocalPhoto, NewPhoto, NewRemoteRecord, RemoteRecord};
use crate::storage::{FsBlobStore, PhotoStore};
use crate::stores::{
    BlobStore, DeleteOutcome, LocalStore, LocalStoreError, RemoteError, RemoteStore,
};

pub const T: i64 = 1_700_000_000;

pub fn at(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(seconds).unwrap()
}

pub fn png_bytes(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([shade, 64, 128]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub puts: usize,
    pub queries: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct FakeState {
    records: Vec<RemoteRecord>,
    next_id: u64,
    calls: CallCounts,
    put_intervals: Vec<(Instant, Instant)>,
    unavailable: bool,
    fail_puts: bool,
    fail_deletes: Option<String>,
}

/// In-memory remote store that records every call.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
    active_puts: AtomicUsize,
    max_active_puts: AtomicUsize,
    put_delay: Duration,
}

impl FakeRemote {
    pub fn with_put_delay(delay: Duration) -> Self {
        Self {
            put_delay: delay,
            ..Self::default()
        }
    }

    pub fn seed(&self, record: RemoteRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    pub fn remove_out_of_band(&self, remote_id: &str) {
        self.state
            .lock()
            .unwrap()
            .records
            .retain(|r| r.remote_id != remote_id);
    }

    pub fn records(&self) -> Vec<RemoteRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn put_intervals(&self) -> Vec<(Instant, Instant)> {
        self.state.lock().unwrap().put_intervals.clone()
    }

    pub fn max_concurrent_puts(&self) -> usize {
        self.max_active_puts.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn fail_puts(&self, fail: bool) {
        self.state.lock().unwrap().fail_puts = fail;
    }

    pub fn fail_deletes(&self, message: &str) {
        self.state.lock().unwrap().fail_deletes = Some(message.to_string());
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn ensure_available(&self) -> Result<(), RemoteError> {
        if self.state.lock().unwrap().unavailable {
            return Err(RemoteError::Unavailable("signed out".into()));
        }
        Ok(())
    }

    async fn put(&self, record: &NewRemoteRecord) -> Result<String, RemoteError> {
        let started = Instant::now();
        let active = self.active_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_puts.fetch_max(active, Ordering::SeqCst);
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        self.active_puts.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        state.calls.puts += 1;
        state.put_intervals.push((started, Instant::now()));
        if state.fail_puts {
            return Err(RemoteError::Store("quota exceeded".into()));
        }
        state.next_id += 1;
        let remote_id = format!("rec-{}", state.next_id);
        state
            .records
            .push(record.clone().into_record(remote_id.clone()));
        Ok(remote_id)
    }

    async fn query(&self, owner_key: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.queries += 1;
        Ok(state
            .records
            .iter()
            .filter(|r| r.owner_key == owner_key)
            .cloned()
            .collect())
    }

    async fn query_all(&self) -> Result<Vec<RemoteRecord>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.queries += 1;
        Ok(state.records.clone())
    }

    async fn delete(&self, remote_id: &str) -> Result<DeleteOutcome, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.deletes += 1;
        if let Some(message) = &state.fail_deletes {
            return Err(RemoteError::Store(message.clone()));
        }
        let before = state.records.len();
        state.records.retain(|r| r.remote_id != remote_id);
        if state.records.len() == before {
            Ok(DeleteOutcome::NotFound)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }
}

fn injected_failure() -> LocalStoreError {
    LocalStoreError::Io(std::io::Error::other("injected failure"))
}

/// Local store that delegates to a real one but can fail chosen writes.
pub struct FlakyLocal {
    inner: Arc<PhotoStore>,
    fail_inserts: AtomicBool,
    fail_ref_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyLocal {
    pub fn new(inner: Arc<PhotoStore>) -> Self {
        Self {
            inner,
            fail_inserts: AtomicBool::new(false),
            fail_ref_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ref_updates(&self, fail: bool) {
        self.fail_ref_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalStore for FlakyLocal {
    async fn insert(&self, photo: &NewPhoto) -> Result<LocalPhoto, LocalStoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        self.inner.insert(photo).await
    }

    async fn get(&self, id: LocalId) -> Result<Option<LocalPhoto>, LocalStoreError> {
        self.inner.get(id).await
    }

    async fn list_by_owner(&self, owner_key: &str) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        self.inner.list_by_owner(owner_key).await
    }

    async fn list_all(&self) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        self.inner.list_all().await
    }

    async fn update_remote_ref(
        &self,
        id: LocalId,
        remote_id: &str,
    ) -> Result<bool, LocalStoreError> {
        if self.fail_ref_updates.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        self.inner.update_remote_ref(id, remote_id).await
    }

    async fn delete(&self, id: LocalId) -> Result<bool, LocalStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        self.inner.delete(id).await
    }

    async fn collapse_duplicates(
        &self,
        owner_key: &str,
    ) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        self.inner.collapse_duplicates(owner_key).await
    }
}

pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub remote: Arc<FakeRemote>,
    /// The store behind the engine, for direct reads in assertions.
    pub local: Arc<PhotoStore>,
    /// Fault switches on the engine's view of the local store.
    pub local_faults: Arc<FlakyLocal>,
    pub blobs: Arc<FsBlobStore>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_remote(FakeRemote::default()).await
    }

    pub async fn with_remote(remote: FakeRemote) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let local = Arc::new(PhotoStore::from_pool(pool));
        local.init().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path().join("photos")));
        let remote = Arc::new(remote);
        let local_faults = Arc::new(FlakyLocal::new(local.clone()));
        let engine = Arc::new(
            SyncEngine::new(remote.clone(), local_faults.clone(), blobs.clone())
                .with_upload_gate(UploadGate::new()),
        );
        Self {
            engine,
            remote,
            local,
            local_faults,
            blobs,
            _dir: dir,
        }
    }

    /// Inserts a local photo with a chosen file name and creation time.
    pub async fn seed_local(&self, owner: &str, name: &str, created: i64, shade: u8) -> LocalPhoto {
        let bytes = png_bytes(shade);
        let saved = self.blobs.save(&bytes, owner).await.unwrap();
        self.local
            .insert(&NewPhoto {
                owner_key: owner.into(),
                file_name: name.into(),
                file_path: saved.path,
                created_at: at(created),
                remote_ref: None,
                fingerprint: Some(crate::model::fingerprint(&bytes)),
            })
            .await
            .unwrap()
    }

    pub fn seed_remote(&self, remote_id: &str, owner: &str, name: &str, created: i64) -> RemoteRecord {
        let record = RemoteRecord {
            remote_id: remote_id.into(),
            owner_key: owner.into(),
            file_name: name.into(),
            created_at: at(created),
            image_bytes: png_bytes(200),
            back_ref: None,
        };
        self.remote.seed(record.clone());
        record
    }

    pub async fn local_rows(&self, owner: &str) -> Vec<LocalPhoto> {
        self.local.list_by_owner(owner).await.unwrap()
    }
}

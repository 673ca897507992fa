//! Seams between the sync engine and the stores it reconciles.
//!
//! The engine owns no storage itself; it is handed one implementation of each
//! trait at construction time.

use async_trait::async_trait;
use thiserror::Error;

pub use navphoto_core::DeleteOutcome;

use crate::model::{LocalId, LocalPhoto, NewPhoto, NewRemoteRecord, RemoteRecord};
use crate::storage::paths::PathError;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store error: {0}")]
    Store(String),
}

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid blob path: {0}")]
    Path(#[from] PathError),
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Account/reachability probe, run once before a pass touches any item.
    async fn ensure_available(&self) -> Result<(), RemoteError>;
    async fn put(&self, record: &NewRemoteRecord) -> Result<String, RemoteError>;
    async fn query(&self, owner_key: &str) -> Result<Vec<RemoteRecord>, RemoteError>;
    async fn query_all(&self) -> Result<Vec<RemoteRecord>, RemoteError>;
    async fn delete(&self, remote_id: &str) -> Result<DeleteOutcome, RemoteError>;
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn insert(&self, photo: &NewPhoto) -> Result<LocalPhoto, LocalStoreError>;
    async fn get(&self, id: LocalId) -> Result<Option<LocalPhoto>, LocalStoreError>;
    async fn list_by_owner(&self, owner_key: &str) -> Result<Vec<LocalPhoto>, LocalStoreError>;
    async fn list_all(&self) -> Result<Vec<LocalPhoto>, LocalStoreError>;
    /// Returns false when the row is missing or already points elsewhere.
    async fn update_remote_ref(
        &self,
        id: LocalId,
        remote_id: &str,
    ) -> Result<bool, LocalStoreError>;
    async fn delete(&self, id: LocalId) -> Result<bool, LocalStoreError>;
    /// Removes local duplicates for the owner and returns the removed rows.
    async fn collapse_duplicates(
        &self,
        owner_key: &str,
    ) -> Result<Vec<LocalPhoto>, LocalStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBlob {
    pub path: String,
    pub file_name: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores bytes under a freshly generated file name scoped to the owner.
    async fn save(&self, bytes: &[u8], owner_key: &str) -> Result<SavedBlob, BlobError>;
    /// `Ok(None)` when nothing is stored at `path`.
    async fn load(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError>;
    /// Deleting a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;
}

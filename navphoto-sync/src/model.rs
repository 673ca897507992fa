use time::OffsetDateTime;

pub type LocalId = i64;

/// A photo row in the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPhoto {
    pub id: LocalId,
    pub owner_key: String,
    pub file_name: String,
    /// Opaque handle into the blob store.
    pub file_path: String,
    pub created_at: OffsetDateTime,
    /// Set on first successful upload or first-contact download, never rewritten.
    pub remote_ref: Option<String>,
    /// SHA-256 of the image bytes, hex encoded, when known at insert time.
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPhoto {
    pub owner_key: String,
    pub file_name: String,
    pub file_path: String,
    pub created_at: OffsetDateTime,
    pub remote_ref: Option<String>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub owner_key: String,
    pub file_name: String,
    pub created_at: OffsetDateTime,
    pub image_bytes: Vec<u8>,
    pub back_ref: Option<LocalId>,
}

/// Record contents sent to the remote store; the id comes back from `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRemoteRecord {
    pub owner_key: String,
    pub file_name: String,
    pub created_at: OffsetDateTime,
    pub image_bytes: Vec<u8>,
    pub back_ref: Option<LocalId>,
}

impl NewRemoteRecord {
    pub fn into_record(self, remote_id: String) -> RemoteRecord {
        RemoteRecord {
            remote_id,
            owner_key: self.owner_key,
            file_name: self.file_name,
            created_at: self.created_at,
            image_bytes: self.image_bytes,
            back_ref: self.back_ref,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    NotSynced,
    Syncing,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::NotSynced => "not_synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(bytes))
}

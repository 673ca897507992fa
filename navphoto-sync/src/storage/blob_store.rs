use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::paths::{blob_path_for, owner_dir_name, partial_path};
use crate::stores::{BlobError, BlobStore, SavedBlob};

const DEFAULT_EXTENSION: &str = "jpg";

/// Image bytes on the local filesystem, one directory per owner key.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, handle: &str) -> Result<PathBuf, BlobError> {
        Ok(blob_path_for(&self.root, handle)?)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, bytes: &[u8], owner_key: &str) -> Result<SavedBlob, BlobError> {
        let owner_dir = owner_dir_name(owner_key)?;
        let file_name = generate_file_name(bytes);
        let handle = format!("{owner_dir}/{file_name}");
        let target = self.resolve(&handle)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(&target);
        let mut file = tokio::fs::File::create(&partial).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&partial, &target).await?;

        Ok(SavedBlob {
            path: handle,
            file_name,
        })
    }

    async fn load(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Timestamp plus a random suffix; two saves never share a name.
fn generate_file_name(bytes: &[u8]) -> String {
    let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let extension = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(DEFAULT_EXTENSION);
    format!("photo_{stamp}_{}.{extension}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[tokio::test]
    async fn save_then_load_returns_bytes() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let saved = store.save(b"payload", "NU-1").await.unwrap();

        assert!(saved.path.starts_with("NU-1/"));
        assert!(saved.path.ends_with(&saved.file_name));
        assert!(saved.file_name.ends_with(".jpg"));
        assert_eq!(
            store.load(&saved.path).await.unwrap().as_deref(),
            Some(&b"payload"[..])
        );
        assert!(!partial_path(&store.resolve(&saved.path).unwrap()).exists());
    }

    #[tokio::test]
    async fn save_generates_distinct_names() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let first = store.save(b"same", "NU-1").await.unwrap();
        let second = store.save(b"same", "NU-1").await.unwrap();

        assert_ne!(first.file_name, second.file_name);
    }

    #[tokio::test]
    async fn save_uses_detected_extension() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let saved = store.save(PNG_MAGIC, "NU-1").await.unwrap();

        assert!(saved.file_name.ends_with(".png"));
    }

    #[tokio::test]
    async fn load_missing_blob_is_none() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        assert_eq!(store.load("NU-1/missing.jpg").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let saved = store.save(b"payload", "NU-1").await.unwrap();

        store.delete(&saved.path).await.unwrap();
        store.delete(&saved.path).await.unwrap();

        assert_eq!(store.load(&saved.path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_traversal_in_owner_key() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let err = store.save(b"payload", "../escape").await.unwrap_err();

        assert!(matches!(err, BlobError::Path(_)));
    }
}

use std::{fs, path::Path};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool, migrate::Migrator};
use time::OffsetDateTime;

use crate::model::{LocalId, LocalPhoto, NewPhoto};
use crate::stores::{LocalStore, LocalStoreError};
use crate::sync::dedup::plan_collapse;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const PHOTO_COLUMNS: &str =
    "id, owner_key, file_name, file_path, created_at, remote_ref, fingerprint";

/// SQLite-backed photo metadata.
pub struct PhotoStore {
    pool: SqlitePool,
}

impl PhotoStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path) -> Result<Self, LocalStoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), LocalStoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_where(
        &self,
        clause: &str,
        owner_key: Option<&str>,
    ) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        let sql = format!(
            "SELECT {PHOTO_COLUMNS} FROM photos {clause} ORDER BY created_at ASC, id ASC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(owner_key) = owner_key {
            query = query.bind(owner_key);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(photo_from_row).collect()
    }
}

#[async_trait]
impl LocalStore for PhotoStore {
    async fn insert(&self, photo: &NewPhoto) -> Result<LocalPhoto, LocalStoreError> {
        let created_at = to_unix_millis(photo.created_at);
        let result = sqlx::query(
            "INSERT INTO photos (owner_key, file_name, file_path, created_at, remote_ref, fingerprint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&photo.owner_key)
        .bind(&photo.file_name)
        .bind(&photo.file_path)
        .bind(created_at)
        .bind(&photo.remote_ref)
        .bind(&photo.fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(LocalPhoto {
            id: result.last_insert_rowid(),
            owner_key: photo.owner_key.clone(),
            file_name: photo.file_name.clone(),
            file_path: photo.file_path.clone(),
            created_at: from_unix_millis(created_at)?,
            remote_ref: photo.remote_ref.clone(),
            fingerprint: photo.fingerprint.clone(),
        })
    }

    async fn get(&self, id: LocalId) -> Result<Option<LocalPhoto>, LocalStoreError> {
        let sql = format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(photo_from_row).transpose()
    }

    async fn list_by_owner(&self, owner_key: &str) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        self.fetch_where("WHERE owner_key = ?1", Some(owner_key))
            .await
    }

    async fn list_all(&self) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        self.fetch_where("", None).await
    }

    async fn update_remote_ref(
        &self,
        id: LocalId,
        remote_id: &str,
    ) -> Result<bool, LocalStoreError> {
        let result = sqlx::query(
            "UPDATE photos SET remote_ref = ?1
             WHERE id = ?2 AND (remote_ref IS NULL OR remote_ref = ?1)",
        )
        .bind(remote_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: LocalId) -> Result<bool, LocalStoreError> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn collapse_duplicates(
        &self,
        owner_key: &str,
    ) -> Result<Vec<LocalPhoto>, LocalStoreError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE owner_key = ?1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_key)
            .fetch_all(&mut *tx)
            .await?;
        let photos = rows
            .iter()
            .map(photo_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let plan = plan_collapse(&photos);
        for (kept_id, remote_ref) in &plan.adopted_refs {
            sqlx::query("UPDATE photos SET remote_ref = ?1 WHERE id = ?2 AND remote_ref IS NULL")
                .bind(remote_ref)
                .bind(kept_id)
                .execute(&mut *tx)
                .await?;
        }
        for removed in &plan.removed {
            sqlx::query("DELETE FROM photos WHERE id = ?1")
                .bind(removed.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(plan.removed)
    }
}

fn photo_from_row(row: &SqliteRow) -> Result<LocalPhoto, LocalStoreError> {
    let created_at: i64 = row.try_get("created_at")?;
    Ok(LocalPhoto {
        id: row.try_get("id")?,
        owner_key: row.try_get("owner_key")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        created_at: from_unix_millis(created_at)?,
        remote_ref: row.try_get("remote_ref")?,
        fingerprint: row.try_get("fingerprint")?,
    })
}

fn to_unix_millis(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_unix_millis(millis: i64) -> Result<OffsetDateTime, LocalStoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|_| LocalStoreError::InvalidTimestamp(millis))
}

#[cfg(test)]
#[path = "photo_store_tests.rs"]
mod tests;

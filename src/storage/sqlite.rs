//! SqliteStore — fragment metadata in SQLite, payloads as files on disk
//! sharded beneath `base_path/{owner}/{shard}/{shard}/{id}`.

use super::{FragmentStore, StorageError, StorageResult};
use crate::models::fragment::FragmentRecord;
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_KEY_LEN: usize = 256;
const MIGRATIONS: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Open (creating if needed) the database at `database_url` and apply
    /// the schema.
    pub async fn connect(
        database_url: &str,
        base_path: impl Into<PathBuf>,
        max_connections: u32,
    ) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let store = Self::new(Arc::new(pool), base_path);
        fs::create_dir_all(&store.base_path).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = MIGRATIONS
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject path segments that could escape `base_path`.
    fn ensure_key_safe(segment: &str) -> StorageResult<()> {
        if segment.is_empty() || segment.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey);
        }
        if segment.starts_with('.') || segment.contains('/') || segment.contains('\\') {
            return Err(StorageError::InvalidKey);
        }
        if segment.bytes().any(|b| b.is_ascii_control()) {
            return Err(StorageError::InvalidKey);
        }
        Ok(())
    }

    fn owner_root(&self, owner_id: &str) -> PathBuf {
        self.base_path.join(owner_id)
    }

    /// Two-level shard from MD5(owner/id); keeps directories small.
    fn shards(owner_id: &str, id: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", owner_id, id));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn data_path(&self, owner_id: &str, id: &str) -> StorageResult<PathBuf> {
        Self::ensure_key_safe(owner_id)?;
        Self::ensure_key_safe(id)?;
        let (shard_a, shard_b) = Self::shards(owner_id, id);
        let mut path = self.owner_root(owner_id);
        path.push(shard_a);
        path.push(shard_b);
        path.push(id);
        Ok(path)
    }

    /// Write `data` to a synced temp file next to `target` and return its path.
    async fn stage_file(target: &Path, data: &[u8]) -> StorageResult<PathBuf> {
        let parent = target.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "payload path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(tmp_path)
    }

    async fn commit_file(tmp_path: &Path, target: &Path) -> StorageResult<()> {
        if let Err(err) = fs::rename(tmp_path, target).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(target).await?;
                fs::rename(tmp_path, target).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        Ok(())
    }

    /// Move an existing payload out of the way so it can be put back if the
    /// metadata transaction fails to commit.
    async fn set_aside(target: &Path) -> io::Result<Option<PathBuf>> {
        let Some(parent) = target.parent() else {
            return Ok(None);
        };
        let backup = parent.join(format!(".bak-{}", Uuid::new_v4()));
        match fs::rename(target, &backup).await {
            Ok(()) => Ok(Some(backup)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Undo a [`Self::set_aside`]: put the old payload back, or remove
    /// `target` when there was none.
    async fn restore(backup: Option<PathBuf>, target: &Path) {
        let restored = match &backup {
            Some(backup) => fs::rename(backup, target).await,
            None => fs::remove_file(target).await,
        };
        match restored {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(error = %err, "could not restore payload {}", target.display()),
        }
    }

    async fn discard(backup: Option<PathBuf>) {
        if let Some(backup) = backup {
            let _ = fs::remove_file(&backup).await;
        }
    }

    async fn upsert<'e, E>(executor: E, record: &FragmentRecord) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO fragments (owner_id, id, created, updated, content_type, size)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, id) DO UPDATE SET
                created = excluded.created,
                updated = excluded.updated,
                content_type = excluded.content_type,
                size = excluded.size
            "#,
        )
        .bind(&record.owner_id)
        .bind(&record.id)
        .bind(record.created)
        .bind(record.updated)
        .bind(&record.content_type)
        .bind(record.size)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn remove_file(&self, owner_id: &str, path: &Path) -> io::Result<bool> {
        let removed = match fs::remove_file(path).await {
            Ok(_) => {
                debug!("removed payload {}", path.display());
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(err),
        };
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, &self.owner_root(owner_id)).await;
        }
        Ok(removed)
    }

    /// Remove empty shard directories up to (excluding) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl FragmentStore for SqliteStore {
    async fn put_metadata(&self, record: &FragmentRecord) -> StorageResult<()> {
        Self::upsert(&*self.db, record).await?;
        Ok(())
    }

    async fn get_metadata(&self, owner_id: &str, id: &str) -> StorageResult<Option<FragmentRecord>> {
        let record = sqlx::query_as::<_, FragmentRecord>(
            "SELECT id, owner_id, created, updated, content_type, size
             FROM fragments WHERE owner_id = ? AND id = ?",
        )
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn list_metadata(&self, owner_id: &str) -> StorageResult<Vec<FragmentRecord>> {
        let records = sqlx::query_as::<_, FragmentRecord>(
            "SELECT id, owner_id, created, updated, content_type, size
             FROM fragments WHERE owner_id = ? ORDER BY rowid ASC",
        )
        .bind(owner_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(records)
    }

    async fn list_ids(&self, owner_id: &str) -> StorageResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM fragments WHERE owner_id = ? ORDER BY rowid ASC",
        )
        .bind(owner_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(ids)
    }

    async fn delete_metadata(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM fragments WHERE owner_id = ? AND id = ?")
            .bind(owner_id)
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_data(&self, owner_id: &str, id: &str, data: Bytes) -> StorageResult<()> {
        let target = self.data_path(owner_id, id)?;
        let tmp_path = Self::stage_file(&target, &data).await?;
        Self::commit_file(&tmp_path, &target).await
    }

    async fn get_data(&self, owner_id: &str, id: &str) -> StorageResult<Option<Bytes>> {
        // unsafe keys can never have been written
        let Ok(path) = self.data_path(owner_id, id) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn delete_data(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        let Ok(path) = self.data_path(owner_id, id) else {
            return Ok(false);
        };
        Ok(self.remove_file(owner_id, &path).await?)
    }

    /// Stages the payload, upserts metadata in a transaction, moves the
    /// payload into place, then commits. A failed move rolls the row back;
    /// a failed commit puts the previous payload back.
    async fn put_fragment(&self, record: &FragmentRecord, data: Bytes) -> StorageResult<()> {
        let target = self.data_path(&record.owner_id, &record.id)?;
        let tmp_path = Self::stage_file(&target, &data).await?;

        let mut tx = match self.db.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        };
        if let Err(err) = Self::upsert(&mut *tx, record).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        let backup = match Self::set_aside(&target).await {
            Ok(backup) => backup,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        };
        if let Err(err) = Self::commit_file(&tmp_path, &target).await {
            Self::restore(backup, &target).await;
            return Err(err);
        }
        if let Err(err) = tx.commit().await {
            Self::restore(backup, &target).await;
            return Err(err.into());
        }
        Self::discard(backup).await;
        Ok(())
    }

    /// Deletes the row in a transaction that commits only once the payload
    /// file is set aside. A failed commit puts the payload back.
    async fn delete_fragment(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        // unsafe keys have no payload file, only possibly a stray row
        let path = self.data_path(owner_id, id).ok();
        let mut tx = self.db.begin().await?;
        let result = sqlx::query("DELETE FROM fragments WHERE owner_id = ? AND id = ?")
            .bind(owner_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let Some(path) = path else {
            tx.commit().await?;
            return Ok(result.rows_affected() > 0);
        };
        let backup = Self::set_aside(&path)
            .await
            .map_err(|err| StorageError::PartialDelete {
                id: id.to_string(),
                reason: err.to_string(),
            })?;
        if let Err(err) = tx.commit().await {
            if backup.is_some() {
                Self::restore(backup, &path).await;
            }
            return Err(err.into());
        }
        let removed = backup.is_some();
        Self::discard(backup).await;
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, &self.owner_root(owner_id)).await;
        }
        if removed {
            debug!("removed payload {}", path.display());
        }
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::Other,
                format!("unexpected probe result: {}", one),
            )));
        }

        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "payload directory content mismatch",
            )));
        }
        Ok(())
    }
}

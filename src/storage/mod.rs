//! Storage backend contract for fragment metadata and payloads.
//!
//! Records are addressed by `(owner_id, id)`. Metadata and payload are kept
//! as two independently addressable records; the paired operations
//! (`put_fragment`, `delete_fragment`) let a backend make them one unit.

pub mod memory;
pub mod sqlite;

use crate::models::fragment::FragmentRecord;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid fragment key")]
    InvalidKey,
    #[error("delete of fragment `{id}` incomplete: {reason}")]
    PartialDelete { id: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for fragment metadata and payloads.
///
/// Implementations must be `Send + Sync` and safe for concurrent access to
/// distinct keys. Concurrent writers to one key race; the last write wins.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Insert or overwrite the metadata row for `(record.owner_id, record.id)`.
    async fn put_metadata(&self, record: &FragmentRecord) -> StorageResult<()>;

    /// Metadata for a key, `None` when absent.
    async fn get_metadata(&self, owner_id: &str, id: &str) -> StorageResult<Option<FragmentRecord>>;

    /// All metadata rows for an owner, in insertion order.
    async fn list_metadata(&self, owner_id: &str) -> StorageResult<Vec<FragmentRecord>>;

    /// Ids of an owner's fragments, in the same order as [`list_metadata`](Self::list_metadata).
    async fn list_ids(&self, owner_id: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .list_metadata(owner_id)
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect())
    }

    /// Remove a metadata row. Returns `true` if it existed.
    async fn delete_metadata(&self, owner_id: &str, id: &str) -> StorageResult<bool>;

    /// Insert or overwrite a payload.
    async fn put_data(&self, owner_id: &str, id: &str, data: Bytes) -> StorageResult<()>;

    /// Payload for a key, `None` when absent.
    async fn get_data(&self, owner_id: &str, id: &str) -> StorageResult<Option<Bytes>>;

    /// Remove a payload. Returns `true` if it existed.
    async fn delete_data(&self, owner_id: &str, id: &str) -> StorageResult<bool>;

    /// Write metadata and payload together.
    async fn put_fragment(&self, record: &FragmentRecord, data: Bytes) -> StorageResult<()> {
        self.put_metadata(record).await?;
        self.put_data(&record.owner_id, &record.id, data).await
    }

    /// Remove metadata and payload together. Returns `false` when no
    /// metadata existed for the key.
    async fn delete_fragment(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        let existed = self.delete_metadata(owner_id, id).await?;
        if let Err(err) = self.delete_data(owner_id, id).await {
            return Err(StorageError::PartialDelete {
                id: id.to_string(),
                reason: err.to_string(),
            });
        }
        Ok(existed)
    }

    /// Readiness probe for the backend.
    async fn health_check(&self) -> StorageResult<()>;
}

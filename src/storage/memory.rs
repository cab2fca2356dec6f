use super::{FragmentStore, StorageResult};
use crate::models::fragment::FragmentRecord;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;

/// One owner's fragments. `metadata` keeps first-write order.
#[derive(Debug, Default)]
struct OwnerEntries {
    metadata: Vec<FragmentRecord>,
    data: HashMap<String, Bytes>,
}

impl OwnerEntries {
    /// Replace in place, or append so first-write order is kept.
    fn upsert(&mut self, record: &FragmentRecord) {
        match self.metadata.iter().position(|r| r.id == record.id) {
            Some(pos) => self.metadata[pos] = record.clone(),
            None => self.metadata.push(record.clone()),
        }
    }
}

/// In-memory [`FragmentStore`] backed by a [`DashMap`] keyed by owner.
///
/// Nothing survives a restart. Owners are sharded independently, so writers
/// for different owners never contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    owners: DashMap<String, OwnerEntries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FragmentStore for MemoryStore {
    async fn put_metadata(&self, record: &FragmentRecord) -> StorageResult<()> {
        self.owners
            .entry(record.owner_id.clone())
            .or_default()
            .upsert(record);
        Ok(())
    }

    async fn get_metadata(&self, owner_id: &str, id: &str) -> StorageResult<Option<FragmentRecord>> {
        Ok(self
            .owners
            .get(owner_id)
            .and_then(|entries| entries.metadata.iter().find(|r| r.id == id).cloned()))
    }

    async fn list_metadata(&self, owner_id: &str) -> StorageResult<Vec<FragmentRecord>> {
        Ok(self
            .owners
            .get(owner_id)
            .map(|entries| entries.metadata.clone())
            .unwrap_or_default())
    }

    async fn delete_metadata(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        let Some(mut entries) = self.owners.get_mut(owner_id) else {
            return Ok(false);
        };
        let before = entries.metadata.len();
        entries.metadata.retain(|r| r.id != id);
        Ok(entries.metadata.len() != before)
    }

    async fn put_data(&self, owner_id: &str, id: &str, data: Bytes) -> StorageResult<()> {
        self.owners
            .entry(owner_id.to_string())
            .or_default()
            .data
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn get_data(&self, owner_id: &str, id: &str) -> StorageResult<Option<Bytes>> {
        Ok(self
            .owners
            .get(owner_id)
            .and_then(|entries| entries.data.get(id).cloned()))
    }

    async fn delete_data(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        Ok(self
            .owners
            .get_mut(owner_id)
            .is_some_and(|mut entries| entries.data.remove(id).is_some()))
    }

    /// Both records change under one shard lock.
    async fn put_fragment(&self, record: &FragmentRecord, data: Bytes) -> StorageResult<()> {
        let mut entries = self.owners.entry(record.owner_id.clone()).or_default();
        entries.upsert(record);
        entries.data.insert(record.id.clone(), data);
        Ok(())
    }

    async fn delete_fragment(&self, owner_id: &str, id: &str) -> StorageResult<bool> {
        let Some(mut entries) = self.owners.get_mut(owner_id) else {
            return Ok(false);
        };
        let before = entries.metadata.len();
        entries.metadata.retain(|r| r.id != id);
        entries.data.remove(id);
        Ok(entries.metadata.len() != before)
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

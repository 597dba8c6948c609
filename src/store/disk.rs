use crate::core::error::StoreError;
use crate::store::KeyValueCollection;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::sync::Arc;
use tracing::debug;

/// Collection stored in a fjall partition.
///
/// Every write is journaled and then synced, so a single `put` or a `put_batch` is either
/// fully visible after a crash or not at all.
pub struct DiskCollection {
    keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Arc<Keyspace>, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .partition
            .get(key)
            .map_err(|e| StoreError::Read(e.to_string()))?;
        if value.is_none() {
            debug!(key = %String::from_utf8_lossy(key), "Disk collection MISS");
        }
        Ok(value.map(|v| v.to_vec()))
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.partition
            .insert(key, value)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        self.sync()
    }

    async fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        let mut batch = self.keyspace.batch();
        for (key, value) in entries {
            batch.insert(&self.partition, key, value);
        }
        batch
            .commit()
            .map_err(|e| StoreError::Write(e.to_string()))?;
        self.sync()
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.partition
            .remove(key)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        self.sync()
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.partition
            .prefix(prefix)
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| StoreError::Read(e.to_string()))
            })
            .collect()
    }
}

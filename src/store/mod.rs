pub mod disk;
pub mod memory;

use crate::core::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    fs::{File, OpenOptions, TryLockError},
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::debug;

/// A named, ordered collection of byte keys and byte values.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    /// Writes every entry or none of them.
    async fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError>;

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

const LOCK_FILE: &str = "vtrade.lock";

/// Opens and hands out collections. Persistent stores are backed by one fjall keyspace.
///
/// A persistent store holds an exclusive lock on its data directory until it is dropped, so
/// at most one process mutates a given data directory at a time.
pub struct KeyValueStore {
    collections: Mutex<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
    _lock: Option<File>,
}

impl KeyValueStore {
    /// A store whose collections live in memory only.
    pub fn in_memory() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            keyspace: None,
            _lock: None,
        }
    }

    /// A store persisted under `path`. Fails with [`StoreError::Locked`] while another store
    /// has the same directory open.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let lock = lock_data_dir(path)?;
        let keyspace = fjall::Config::new(path.join("store"))
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        debug!(path = %path.display(), "Opened persistent store");

        Ok(Self {
            collections: Mutex::new(HashMap::new()),
            keyspace: Some(Arc::new(keyspace)),
            _lock: Some(lock),
        })
    }

    pub fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>, StoreError> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| StoreError::Read("collection registry poisoned".to_string()))?;
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection: Arc<dyn KeyValueCollection> = match &self.keyspace {
            Some(keyspace) => {
                let partition = keyspace
                    .open_partition(name, PartitionCreateOptions::default())
                    .map_err(|e| StoreError::Read(format!("open partition {name}: {e}")))?;
                Arc::new(DiskCollection::new(Arc::clone(keyspace), partition))
            }
            None => Arc::new(MemoryCollection::new()),
        };

        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }
}

fn lock_data_dir(path: &Path) -> Result<File> {
    let lock_path = path.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    match file.try_lock() {
        Ok(()) => {
            debug!(path = %lock_path.display(), "Acquired data directory lock");
            Ok(file)
        }
        Err(TryLockError::WouldBlock) => {
            Err(StoreError::Locked(path.display().to_string()).into())
        }
        Err(TryLockError::Error(e)) => Err(anyhow::Error::new(e)
            .context(format!("Failed to lock {}", lock_path.display()))),
    }
}

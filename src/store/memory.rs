use crate::core::error::StoreError;
use crate::store::KeyValueCollection;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection backed by an ordered map.
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.inner.lock().await;
        let value = map.get(key).cloned();
        if value.is_none() {
            debug!(key = %String::from_utf8_lossy(key), "Memory collection MISS");
        }
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        map.insert(key.to_vec(), value);
        Ok(())
    }

    async fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        // One lock for the whole batch keeps it all-or-nothing for readers.
        let mut map = self.inner.lock().await;
        map.extend(entries);
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        map.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let map = self.inner.lock().await;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_put_remove() {
        let collection = MemoryCollection::new();

        // Initially, collection is empty
        assert!(collection.get(b"key1").await.unwrap().is_none());

        collection.put(b"key1", b"123".to_vec()).await.unwrap();
        assert_eq!(collection.get(b"key1").await.unwrap(), Some(b"123".to_vec()));

        collection.remove(b"key1").await.unwrap();
        assert!(collection.get(b"key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_prefix_is_ordered_and_bounded() {
        let collection = MemoryCollection::new();
        collection
            .put_batch(vec![
                (b"b/2".to_vec(), b"y".to_vec()),
                (b"a/1".to_vec(), b"x".to_vec()),
                (b"b/1".to_vec(), b"z".to_vec()),
                (b"c/1".to_vec(), b"w".to_vec()),
            ])
            .await
            .unwrap();

        let keys: Vec<Vec<u8>> = collection
            .scan_prefix(b"b/")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"b/1".to_vec(), b"b/2".to_vec()]);
        assert_eq!(collection.scan_prefix(b"").await.unwrap().len(), 4);
    }
}

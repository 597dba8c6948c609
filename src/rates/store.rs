//! Durable rate snapshot plus the append-only quote history.

use crate::core::error::{ExchangeError, StoreError};
use crate::core::rate::{HistoryEntry, RateEntry, RatePair, RateStoreSnapshot};
use crate::rates::RateSink;
use crate::store::{KeyValueCollection, KeyValueStore};
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RATES_COLLECTION: &str = "rates";
const HISTORY_COLLECTION: &str = "history";
const SNAPSHOT_KEY: &[u8] = b"snapshot";

#[derive(Clone)]
pub struct RateStore {
    rates: Arc<dyn KeyValueCollection>,
    history: Arc<dyn KeyValueCollection>,
}

impl RateStore {
    pub fn open(store: &KeyValueStore) -> Result<Self, StoreError> {
        Ok(Self {
            rates: store.collection(RATES_COLLECTION)?,
            history: store.collection(HISTORY_COLLECTION)?,
        })
    }

    /// The current snapshot. Missing or unreadable data reads as an empty snapshot.
    pub async fn snapshot(&self) -> RateStoreSnapshot {
        let bytes = match self.rates.get(SNAPSHOT_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return RateStoreSnapshot::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read rate snapshot, treating as empty");
                return RateStoreSnapshot::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "Rate snapshot is corrupted, treating as empty");
            RateStoreSnapshot::default()
        })
    }

    /// Point lookup. `None` is a normal outcome; callers own the fallback policy.
    pub async fn get(&self, pair: &RatePair) -> Option<RateEntry> {
        let entry = self.snapshot().await.pairs.remove(pair);
        if entry.is_none() {
            debug!(%pair, "Rate not in snapshot");
        }
        entry
    }

    /// Swaps in `snapshot` as a whole. Readers see either the old or the new document.
    pub async fn replace(&self, snapshot: &RateStoreSnapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        self.rates.put(SNAPSHOT_KEY, bytes).await?;
        info!(pairs = snapshot.pairs.len(), "Rate snapshot replaced");
        Ok(())
    }

    pub async fn append_history(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        let rows = entries
            .iter()
            .map(|entry| Ok((history_key(entry).into_bytes(), serde_json::to_vec(entry)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.history.put_batch(rows).await?;
        info!(entries = entries.len(), "Appended rate history");
        Ok(())
    }

    /// Most recent history first, optionally restricted to one pair.
    pub async fn history(&self, pair: Option<&RatePair>, limit: usize) -> Vec<HistoryEntry> {
        let rows = match self.history.scan_prefix(b"").await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to read rate history");
                return Vec::new();
            }
        };

        rows.into_iter()
            .rev()
            .filter_map(|(key, value)| match serde_json::from_slice::<HistoryEntry>(&value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "Skipping corrupted history entry");
                    None
                }
            })
            .filter(|entry| pair.is_none_or(|p| &entry.pair() == p))
            .take(limit)
            .collect()
    }
}

fn history_key(entry: &HistoryEntry) -> String {
    format!(
        "{}/{}/{}",
        entry
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        entry.pair(),
        entry.source
    )
}

#[async_trait]
impl RateSink for RateStore {
    async fn replace_snapshot(&self, snapshot: RateStoreSnapshot) -> Result<(), ExchangeError> {
        Ok(self.replace(&snapshot).await?)
    }

    async fn append_history(&self, entries: Vec<HistoryEntry>) -> Result<(), ExchangeError> {
        Ok(RateStore::append_history(self, &entries).await?)
    }
}

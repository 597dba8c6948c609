//! Rate caching: the durable snapshot, freshness-aware reads and the aggregation pipeline.

pub mod aggregator;
pub mod reader;
pub mod store;

pub use aggregator::{AggregationReport, RateAggregator};
pub use reader::{Quote, RateReader};
pub use store::RateStore;

use crate::core::error::ExchangeError;
use crate::core::rate::{HistoryEntry, RateStoreSnapshot};
use async_trait::async_trait;

/// Where an aggregation run publishes its results.
#[async_trait]
pub trait RateSink: Send + Sync {
    async fn replace_snapshot(&self, snapshot: RateStoreSnapshot) -> Result<(), ExchangeError>;

    async fn append_history(&self, entries: Vec<HistoryEntry>) -> Result<(), ExchangeError>;
}

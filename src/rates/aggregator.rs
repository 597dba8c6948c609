//! Polls providers, merges their quotes and publishes one snapshot per run.

use crate::core::error::AggregationError;
use crate::core::error::ValidationError;
use crate::core::rate::{
    HistoryEntry, RateEntry, RateProvider, RateStoreSnapshot, SourceStatus, is_valid_rate,
};
use crate::rates::RateSink;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Summary of one aggregation run, in source processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationReport {
    pub total_rates: usize,
    pub sources: Vec<(String, SourceStatus)>,
    pub timestamp: DateTime<Utc>,
}

impl AggregationReport {
    pub fn status(&self, source: &str) -> Option<&SourceStatus> {
        self.sources
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, status)| status)
    }
}

pub struct RateAggregator {
    providers: Vec<Arc<dyn RateProvider>>,
}

impl RateAggregator {
    pub fn new(providers: Vec<Arc<dyn RateProvider>>) -> Self {
        Self { providers }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Providers to run in the order given, plus the requested names that match none.
    /// An empty request means every known provider; a request where nothing matches is refused.
    fn select(
        &self,
        sources: &[String],
    ) -> Result<(Vec<Arc<dyn RateProvider>>, Vec<String>), AggregationError> {
        if self.providers.is_empty() {
            return Err(AggregationError::NoSources);
        }
        if sources.is_empty() {
            return Ok((self.providers.clone(), Vec::new()));
        }

        let mut selected: Vec<Arc<dyn RateProvider>> = Vec::new();
        let mut unknown: Vec<String> = Vec::new();
        for source in sources {
            match self
                .providers
                .iter()
                .find(|p| p.name().eq_ignore_ascii_case(source))
            {
                Some(provider) => {
                    if !selected.iter().any(|s| s.name() == provider.name()) {
                        selected.push(Arc::clone(provider));
                    }
                }
                None => {
                    warn!(
                        source = %source,
                        known = ?self.source_names(),
                        "Skipping unknown rate source"
                    );
                    if !unknown.contains(source) {
                        unknown.push(source.clone());
                    }
                }
            }
        }

        if selected.is_empty() {
            let first = unknown.into_iter().next().unwrap_or_default();
            return Err(ValidationError::UnknownSource(first).into());
        }
        Ok((selected, unknown))
    }

    pub async fn run(
        &self,
        sink: &dyn RateSink,
        sources: &[String],
    ) -> Result<AggregationReport, AggregationError> {
        self.run_at(sink, sources, Utc::now()).await
    }

    /// Runs the selected providers and commits what they returned, stamped with `timestamp`.
    ///
    /// When two sources quote the same pair the one later in `sources` wins.
    #[instrument(name = "UpdateRates", skip(self, sink, timestamp))]
    pub async fn run_at(
        &self,
        sink: &dyn RateSink,
        sources: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<AggregationReport, AggregationError> {
        let (selected, unknown) = self.select(sources)?;
        info!(sources = ?selected.iter().map(|p| p.name()).collect::<Vec<_>>(), "Updating rates");

        // Fetch concurrently; join_all keeps the request order for the merge below.
        let results = join_all(selected.iter().map(|p| p.fetch_rates())).await;

        let mut snapshot = RateStoreSnapshot {
            last_refresh: Some(timestamp),
            ..Default::default()
        };
        let mut history = Vec::new();
        let mut statuses = Vec::with_capacity(selected.len());

        for (provider, result) in selected.iter().zip(results) {
            let name = provider.name();
            let status = match result {
                Ok(rates) => {
                    let mut rates: Vec<_> = rates.into_iter().collect();
                    rates.sort_by(|a, b| a.0.cmp(&b.0));

                    let mut count = 0;
                    for (pair, rate) in rates {
                        if !is_valid_rate(rate) {
                            warn!(source = name, %pair, rate, "Dropping invalid rate");
                            continue;
                        }
                        history.push(HistoryEntry::new(&pair, rate, timestamp, name));
                        snapshot.pairs.insert(
                            pair,
                            RateEntry {
                                rate,
                                updated_at: timestamp,
                                source: name.to_string(),
                            },
                        );
                        count += 1;
                    }
                    info!(source = name, rates = count, "Source succeeded");
                    SourceStatus::Success { rates_count: count }
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Source failed");
                    SourceStatus::Error {
                        error: e.to_string(),
                    }
                }
            };
            snapshot.source_info.insert(name.to_string(), status.clone());
            statuses.push((name.to_string(), status));
        }

        for name in unknown {
            statuses.push((
                name,
                SourceStatus::Error {
                    error: "unknown source".to_string(),
                },
            ));
        }

        let total_rates = snapshot.pairs.len();
        if total_rates == 0 {
            warn!("No rates obtained, keeping the current snapshot");
        } else {
            sink.replace_snapshot(snapshot)
                .await
                .map_err(AggregationError::Commit)?;

            // The snapshot is authoritative; history is a best-effort audit trail.
            if let Err(e) = sink.append_history(history).await {
                warn!(error = %e, "Failed to append rate history");
            }
        }

        info!(total_rates, "Rate update finished");
        Ok(AggregationReport {
            total_rates,
            sources: statuses,
            timestamp,
        })
    }
}

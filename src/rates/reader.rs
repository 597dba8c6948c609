//! Freshness-aware rate lookups shared by quoting and trading.

use crate::core::currency::CurrencyCode;
use crate::core::error::RateError;
use crate::core::rate::{RatePair, RateStoreSnapshot, reverse_rate};
use crate::rates::store::RateStore;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// A rate as seen by a caller, with its staleness made explicit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
    pub fresh: bool,
    /// The stored pair was the inverse and `rate` was derived from it.
    pub derived: bool,
}

impl Quote {
    pub fn reverse_rate(&self) -> f64 {
        reverse_rate(self.rate)
    }

    pub fn check_fresh(&self) -> Result<(), RateError> {
        if self.fresh {
            return Ok(());
        }
        Err(RateError::Stale {
            from: self.from.to_string(),
            to: self.to.to_string(),
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct RateReader {
    store: RateStore,
    ttl: Duration,
}

impl RateReader {
    pub fn new(store: RateStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn lookup(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<Quote, RateError> {
        self.lookup_at(from, to, Utc::now()).await
    }

    pub async fn lookup_at(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        now: DateTime<Utc>,
    ) -> Result<Quote, RateError> {
        let snapshot = self.store.snapshot().await;
        self.quote_from(&snapshot, from, to, now)
    }

    /// Rate `from`->`to` in one hop through the pivot when no direct quote exists.
    ///
    /// Freshness and timestamp are those of the older leg.
    pub async fn convert_at(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        now: DateTime<Utc>,
    ) -> Result<Quote, RateError> {
        let snapshot = self.store.snapshot().await;
        match self.quote_from(&snapshot, from, to, now) {
            Ok(quote) => Ok(quote),
            Err(unavailable) if from.is_pivot() || to.is_pivot() => Err(unavailable),
            Err(unavailable) => {
                let pivot = CurrencyCode::pivot();
                let (Ok(from_leg), Ok(to_leg)) = (
                    self.quote_from(&snapshot, from, &pivot, now),
                    self.quote_from(&snapshot, to, &pivot, now),
                ) else {
                    return Err(unavailable);
                };
                let older = if from_leg.updated_at <= to_leg.updated_at {
                    &from_leg
                } else {
                    &to_leg
                };
                debug!(%from, %to, "Converted through pivot");
                Ok(Quote {
                    from: from.clone(),
                    to: to.clone(),
                    rate: from_leg.rate * reverse_rate(to_leg.rate),
                    updated_at: older.updated_at,
                    source: format!("{}+{}", from_leg.source, to_leg.source),
                    fresh: from_leg.fresh && to_leg.fresh,
                    derived: true,
                })
            }
        }
    }

    fn quote_from(
        &self,
        snapshot: &RateStoreSnapshot,
        from: &CurrencyCode,
        to: &CurrencyCode,
        now: DateTime<Utc>,
    ) -> Result<Quote, RateError> {
        if from == to {
            return Ok(Quote {
                from: from.clone(),
                to: to.clone(),
                rate: 1.0,
                updated_at: now,
                source: "identity".to_string(),
                fresh: true,
                derived: false,
            });
        }

        let pair = RatePair::new(from.clone(), to.clone());
        let (entry, derived) = match snapshot.pairs.get(&pair) {
            Some(entry) => (entry, false),
            None => match snapshot.pairs.get(&pair.inverse()) {
                Some(entry) => (entry, true),
                None => {
                    return Err(RateError::Unavailable {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            },
        };

        let rate = if derived {
            reverse_rate(entry.rate)
        } else {
            entry.rate
        };
        let fresh = now - entry.updated_at < self.ttl;
        if !fresh {
            debug!(%pair, updated_at = %entry.updated_at, "Rate is stale");
        }

        Ok(Quote {
            from: from.clone(),
            to: to.clone(),
            rate,
            updated_at: entry.updated_at,
            source: entry.source.clone(),
            fresh,
            derived,
        })
    }
}

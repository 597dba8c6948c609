//! Rate types shared by the store, the reader and the providers.

use crate::core::currency::CurrencyCode;
use crate::core::error::{ProviderError, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::str::FromStr;

/// An ordered currency pair, keyed as `FROM_TO` in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RatePair {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl RatePair {
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Self {
        Self { from, to }
    }

    /// The pair quoting `code` in the pivot currency.
    pub fn to_pivot(code: CurrencyCode) -> Self {
        Self::new(code, CurrencyCode::pivot())
    }

    pub fn inverse(&self) -> Self {
        Self::new(self.to.clone(), self.from.clone())
    }

    pub fn involves(&self, code: &CurrencyCode) -> bool {
        &self.from == code || &self.to == code
    }
}

impl Display for RatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.from, self.to)
    }
}

impl FromStr for RatePair {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s.split_once('_').ok_or_else(|| ValidationError::InvalidCode {
            code: s.to_string(),
            reason: "pair must look like FROM_TO",
        })?;
        Ok(Self::new(from.parse()?, to.parse()?))
    }
}

impl TryFrom<String> for RatePair {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RatePair> for String {
    fn from(pair: RatePair) -> Self {
        pair.to_string()
    }
}

/// A strictly positive, finite rate. Anything else is dropped at ingestion.
pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Derives the reverse rate. Zero is only a fallback for invalid input.
pub fn reverse_rate(rate: f64) -> f64 {
    if rate == 0.0 { 0.0 } else { 1.0 / rate }
}

/// One cached quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

/// Outcome of one source in an aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceStatus {
    Success { rates_count: usize },
    Error { error: String },
}

impl SourceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceStatus::Success { .. })
    }
}

/// The full set of cached rates, published and replaced as a unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RateStoreSnapshot {
    #[serde(default)]
    pub pairs: BTreeMap<RatePair, RateEntry>,
    #[serde(default)]
    pub last_refresh: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_info: BTreeMap<String, SourceStatus>,
}

impl RateStoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Immutable audit record of one observed quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl HistoryEntry {
    pub fn new(pair: &RatePair, rate: f64, timestamp: DateTime<Utc>, source: &str) -> Self {
        Self {
            id: format!("{pair}_{}_{source}", timestamp.to_rfc3339()),
            from_currency: pair.from.clone(),
            to_currency: pair.to.clone(),
            rate,
            timestamp,
            source: source.to_string(),
        }
    }

    pub fn pair(&self) -> RatePair {
        RatePair::new(self.from_currency.clone(), self.to_currency.clone())
    }
}

/// An external quote source.
///
/// Pairs the source has no data for are absent from the result rather than errors.
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_rates(&self) -> Result<HashMap<RatePair, f64>, ProviderError>;
}

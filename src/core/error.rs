//! Error taxonomy for the ledger and exchange core.
//!
//! Every failure a caller can act on is a value here. The CLI boundary wraps these in
//! `anyhow` for reporting; nothing inside the core uses errors for normal control flow.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Input rejected before any storage is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid currency code '{code}': {reason}")]
    InvalidCode { code: String, reason: &'static str },

    #[error("unknown currency '{0}'")]
    UnknownCurrency(String),

    #[error("amount must be a finite number")]
    NonFiniteAmount,

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(f64),

    #[error("amount {amount} is below the minimum trade size {minimum}")]
    BelowMinimum { amount: f64, minimum: f64 },

    #[error("cannot trade {0} against itself")]
    PivotTrade(String),

    #[error("unknown rate source '{0}'")]
    UnknownSource(String),

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("unknown user '{0}'")]
    UnknownUser(String),
}

/// Wallet and portfolio invariant violations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient funds: available {available:.4} {currency}, required {required:.4} {currency}")]
    InsufficientFunds {
        currency: String,
        available: f64,
        required: f64,
    },

    #[error("no '{0}' wallet; it is created automatically on the first credit")]
    WalletNotFound(String),

    #[error("wallet amounts must be positive and finite, got {0}")]
    InvalidAmount(f64),
}

/// Rate lookups that cannot produce a usable quote.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateError {
    #[error("rate {from}->{to} is unavailable; run update-rates and retry later")]
    Unavailable { from: String, to: String },

    #[error("rate {from}->{to} is stale (updated {updated_at}); run update-rates and retry later")]
    Stale {
        from: String,
        to: String,
        updated_at: DateTime<Utc>,
    },
}

/// A single quote source failed. Isolated per source during aggregation.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{provider}: {reason}")]
pub struct ProviderError {
    pub provider: String,
    pub reason: String,
}

impl ProviderError {
    pub fn new(provider: &str, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }
}

/// Storage backend failures. Reads of malformed documents are not errors; see the read paths.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("data directory {0} is in use by another vtrade process")]
    Locked(String),
}

/// Failures of a trade, deposit or registration.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("exchange service is not running")]
    ServiceClosed,
}

impl ExchangeError {
    /// Domain rejections leave state untouched and are safe to retry with other inputs.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExchangeError::Validation(_) | ExchangeError::Ledger(_) | ExchangeError::Rate(_)
        )
    }
}

/// Failures of an aggregation run as a whole. Per-source failures live in the run report.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("no rate sources are configured")]
    NoSources,

    #[error(transparent)]
    UnknownSource(#[from] ValidationError),

    #[error("failed to commit rate snapshot: {0}")]
    Commit(#[source] ExchangeError),
}

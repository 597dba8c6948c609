//! Domain types, configuration, logging and errors shared by every layer.

pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod rate;
pub mod wallet;

pub use currency::{CurrencyCode, CurrencyRegistry, PIVOT};
pub use rate::{RatePair, RateProvider};
pub use wallet::{Portfolio, Wallet};

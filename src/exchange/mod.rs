//! Trades and the single-writer service that serialises every mutation.

pub mod audit;
pub mod engine;
pub mod service;

pub use engine::{BuyReceipt, DepositReceipt, Exchange, ExchangeSettings, SellReceipt};
pub use service::{ExchangeHandle, ExchangeService};

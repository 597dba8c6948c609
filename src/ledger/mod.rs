//! User-facing balances: portfolios, the user directory and valuation.

pub mod portfolio;
pub mod users;
pub mod valuation;

pub use portfolio::PortfolioLedger;
pub use users::{User, UserDirectory};
pub use valuation::{PortfolioValuation, WalletValuation, value_portfolio};

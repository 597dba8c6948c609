//! Wallets and per-user portfolios.

use crate::core::currency::CurrencyCode;
use crate::core::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single non-negative currency balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WalletRecord")]
pub struct Wallet {
    currency_code: CurrencyCode,
    balance: f64,
}

#[derive(Deserialize)]
struct WalletRecord {
    currency_code: CurrencyCode,
    balance: f64,
}

impl TryFrom<WalletRecord> for Wallet {
    type Error = String;

    fn try_from(record: WalletRecord) -> Result<Self, Self::Error> {
        if !record.balance.is_finite() || record.balance < 0.0 {
            return Err(format!(
                "invalid balance {} for wallet {}",
                record.balance, record.currency_code
            ));
        }
        Ok(Self {
            currency_code: record.currency_code,
            balance: record.balance,
        })
    }
}

fn check_amount(amount: f64) -> Result<(), LedgerError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

impl Wallet {
    pub fn new(currency_code: CurrencyCode) -> Self {
        Self {
            currency_code,
            balance: 0.0,
        }
    }

    pub fn currency_code(&self) -> &CurrencyCode {
        &self.currency_code
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Credits the wallet and returns the new balance.
    pub fn deposit(&mut self, amount: f64) -> Result<f64, LedgerError> {
        check_amount(amount)?;
        self.balance += amount;
        Ok(self.balance)
    }

    /// Debits the wallet and returns the new balance. The balance is untouched on failure.
    pub fn withdraw(&mut self, amount: f64) -> Result<f64, LedgerError> {
        check_amount(amount)?;
        if amount > self.balance {
            return Err(LedgerError::InsufficientFunds {
                currency: self.currency_code.to_string(),
                available: self.balance,
                required: amount,
            });
        }
        // Clamp so float noise never produces a negative balance.
        self.balance = (self.balance - amount).max(0.0);
        Ok(self.balance)
    }
}

/// All wallets of one user, at most one per currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    user_id: u64,
    wallets: BTreeMap<CurrencyCode, Wallet>,
}

impl Portfolio {
    pub fn empty(user_id: u64) -> Self {
        Self {
            user_id,
            wallets: BTreeMap::new(),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn get_wallet(&self, code: &CurrencyCode) -> Result<&Wallet, LedgerError> {
        self.wallets
            .get(code)
            .ok_or_else(|| LedgerError::WalletNotFound(code.to_string()))
    }

    /// Returns the wallet for `code`, creating it with a zero balance if absent.
    pub fn ensure_wallet(&mut self, code: &CurrencyCode) -> &mut Wallet {
        self.wallets
            .entry(code.clone())
            .or_insert_with(|| Wallet::new(code.clone()))
    }

    /// Credits `code`, creating its wallet on first use.
    pub fn deposit(&mut self, code: &CurrencyCode, amount: f64) -> Result<f64, LedgerError> {
        check_amount(amount)?;
        self.ensure_wallet(code).deposit(amount)
    }

    /// Debits an existing wallet.
    pub fn withdraw(&mut self, code: &CurrencyCode, amount: f64) -> Result<f64, LedgerError> {
        self.wallets
            .get_mut(code)
            .ok_or_else(|| LedgerError::WalletNotFound(code.to_string()))?
            .withdraw(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> CurrencyCode {
        CurrencyCode::parse(raw).unwrap()
    }

    #[test]
    fn test_wallet_deposit_withdraw() {
        let mut wallet = Wallet::new(code("USD"));
        assert_eq!(wallet.deposit(100.0).unwrap(), 100.0);
        assert_eq!(wallet.withdraw(40.0).unwrap(), 60.0);
        assert_eq!(wallet.balance(), 60.0);
    }

    #[test]
    fn test_wallet_rejects_invalid_amounts() {
        let mut wallet = Wallet::new(code("USD"));
        assert_eq!(wallet.deposit(0.0), Err(LedgerError::InvalidAmount(0.0)));
        assert_eq!(wallet.deposit(-5.0), Err(LedgerError::InvalidAmount(-5.0)));
        assert!(wallet.deposit(f64::NAN).is_err());
        assert!(wallet.withdraw(f64::INFINITY).is_err());
        assert_eq!(wallet.balance(), 0.0);
    }

    #[test]
    fn test_overdraw_fails_and_leaves_balance() {
        let mut wallet = Wallet::new(code("BTC"));
        wallet.deposit(0.5).unwrap();

        let err = wallet.withdraw(0.75).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                currency: "BTC".to_string(),
                available: 0.5,
                required: 0.75,
            }
        );
        assert_eq!(wallet.balance(), 0.5);
    }

    #[test]
    fn test_balance_never_negative_over_mixed_sequence() {
        let mut wallet = Wallet::new(code("ETH"));
        let amounts = [
            3.0, -1.0, 0.1, -0.3, 2.5, -10.0, 0.2, -0.2, -2.1, 1e-9, -1e-9, -5.0,
        ];

        for amount in amounts {
            let before = wallet.balance();
            let result = if amount >= 0.0 {
                wallet.deposit(amount)
            } else {
                wallet.withdraw(-amount)
            };
            if result.is_err() {
                assert_eq!(wallet.balance(), before);
            }
            assert!(wallet.balance() >= 0.0);
        }
    }

    #[test]
    fn test_portfolio_wallet_lifecycle() {
        let mut portfolio = Portfolio::empty(7);
        assert!(portfolio.is_empty());
        assert_eq!(
            portfolio.get_wallet(&code("EUR")),
            Err(LedgerError::WalletNotFound("EUR".to_string()))
        );

        portfolio.ensure_wallet(&code("EUR"));
        portfolio.ensure_wallet(&code("EUR"));
        assert_eq!(portfolio.wallets().count(), 1);
        assert_eq!(portfolio.get_wallet(&code("EUR")).unwrap().balance(), 0.0);

        portfolio.deposit(&code("BTC"), 0.25).unwrap();
        assert_eq!(portfolio.withdraw(&code("BTC"), 0.05).unwrap(), 0.2);
        assert!(matches!(
            portfolio.withdraw(&code("ETH"), 1.0),
            Err(LedgerError::WalletNotFound(_))
        ));
    }

    #[test]
    fn test_portfolio_document_layout() {
        let mut portfolio = Portfolio::empty(1);
        portfolio.deposit(&code("USD"), 550.0).unwrap();

        let json = serde_json::to_value(&portfolio).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user_id": 1,
                "wallets": {
                    "USD": {"currency_code": "USD", "balance": 550.0}
                }
            })
        );

        let parsed: Portfolio = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, portfolio);
    }

    #[test]
    fn test_negative_persisted_balance_is_rejected() {
        let doc = r#"{"user_id": 1, "wallets": {"USD": {"currency_code": "USD", "balance": -3.0}}}"#;
        assert!(serde_json::from_str::<Portfolio>(doc).is_err());
    }
}

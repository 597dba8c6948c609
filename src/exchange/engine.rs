//! Buy, sell and deposit against the pivot currency.
//!
//! Every operation loads the user's portfolio, applies all legs to a working copy and
//! persists it with a single save. Any failure before the save leaves stored state as it was.

use crate::core::config::AppConfig;
use crate::core::currency::{CurrencyCode, CurrencyRegistry};
use crate::core::error::{ExchangeError, ValidationError};
use crate::core::rate::{HistoryEntry, RateStoreSnapshot};
use crate::ledger::{PortfolioLedger, User, UserDirectory};
use crate::rates::{Quote, RateReader, RateStore};
use chrono::Utc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSettings {
    pub min_trade_amount: f64,
    pub reject_stale_trades: bool,
}

impl ExchangeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_trade_amount: config.min_trade_amount,
            reject_stale_trades: config.reject_stale_trades,
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuyReceipt {
    pub currency: CurrencyCode,
    pub amount: f64,
    pub rate: f64,
    pub cost_usd: f64,
    /// Balance of the bought currency after the trade.
    pub new_balance: f64,
    pub usd_balance: f64,
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellReceipt {
    pub currency: CurrencyCode,
    pub amount: f64,
    pub old_balance: f64,
    pub new_balance: f64,
    /// 1.0 when selling the pivot itself.
    pub rate: f64,
    pub revenue_usd: f64,
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    pub currency: CurrencyCode,
    pub amount: f64,
    pub new_balance: f64,
}

/// The only component that mutates portfolios, users and the rate snapshot.
///
/// Mutations take `&mut self`; the service task owning this value serialises them.
pub struct Exchange {
    registry: CurrencyRegistry,
    users: UserDirectory,
    ledger: PortfolioLedger,
    rates: RateStore,
    reader: RateReader,
    settings: ExchangeSettings,
}

impl Exchange {
    pub fn new(
        registry: CurrencyRegistry,
        users: UserDirectory,
        ledger: PortfolioLedger,
        reader: RateReader,
        rates: RateStore,
        settings: ExchangeSettings,
    ) -> Self {
        Self {
            registry,
            users,
            ledger,
            rates,
            reader,
            settings,
        }
    }

    /// Registers `username` and stores its empty portfolio.
    pub async fn register(&mut self, username: &str) -> Result<User, ExchangeError> {
        let user = self.users.register(username, Utc::now()).await?;
        let portfolio = self.ledger.load(user.user_id).await;
        self.ledger.save(&portfolio).await?;
        Ok(user)
    }

    pub async fn deposit(
        &mut self,
        user_id: u64,
        currency: &str,
        amount: f64,
    ) -> Result<DepositReceipt, ExchangeError> {
        check_amount(amount)?;
        let code = self.registry.resolve(currency)?.code.clone();

        let mut portfolio = self.ledger.load(user_id).await;
        let new_balance = portfolio.deposit(&code, amount)?;
        self.ledger.save(&portfolio).await?;

        Ok(DepositReceipt {
            currency: code,
            amount,
            new_balance,
        })
    }

    /// Buys `amount` of `currency`, paying in USD at the current `currency`->USD rate.
    pub async fn buy(
        &mut self,
        user_id: u64,
        currency: &str,
        amount: f64,
    ) -> Result<BuyReceipt, ExchangeError> {
        self.check_trade_amount(amount)?;
        let code = self.registry.resolve(currency)?.code.clone();
        if code.is_pivot() {
            return Err(ValidationError::PivotTrade(code.to_string()).into());
        }

        let quote = self.trade_quote(&code).await?;
        let cost_usd = amount * quote.rate;
        debug!(%code, amount, rate = quote.rate, cost_usd, "Pricing buy");

        let usd = CurrencyCode::pivot();
        let mut portfolio = self.ledger.load(user_id).await;
        let usd_balance = portfolio.ensure_wallet(&usd).withdraw(cost_usd)?;
        let new_balance = portfolio.deposit(&code, amount)?;
        self.ledger.save(&portfolio).await?;

        Ok(BuyReceipt {
            currency: code,
            amount,
            rate: quote.rate,
            cost_usd,
            new_balance,
            usd_balance,
            fresh: quote.fresh,
        })
    }

    /// Sells `amount` of `currency` for USD. Selling USD itself only debits the wallet.
    pub async fn sell(
        &mut self,
        user_id: u64,
        currency: &str,
        amount: f64,
    ) -> Result<SellReceipt, ExchangeError> {
        self.check_trade_amount(amount)?;
        let code = self.registry.resolve(currency)?.code.clone();

        let mut portfolio = self.ledger.load(user_id).await;
        let old_balance = portfolio.get_wallet(&code)?.balance();
        let new_balance = portfolio.withdraw(&code, amount)?;

        let (rate, fresh) = if code.is_pivot() {
            (1.0, true)
        } else {
            let quote = self.trade_quote(&code).await?;
            (quote.rate, quote.fresh)
        };
        let revenue_usd = amount * rate;
        if !code.is_pivot() {
            portfolio.deposit(&CurrencyCode::pivot(), revenue_usd)?;
        }
        self.ledger.save(&portfolio).await?;

        Ok(SellReceipt {
            currency: code,
            amount,
            old_balance,
            new_balance,
            rate,
            revenue_usd,
            fresh,
        })
    }

    pub async fn replace_snapshot(
        &mut self,
        snapshot: RateStoreSnapshot,
    ) -> Result<(), ExchangeError> {
        Ok(self.rates.replace(&snapshot).await?)
    }

    pub async fn append_history(&mut self, entries: Vec<HistoryEntry>) -> Result<(), ExchangeError> {
        Ok(self.rates.append_history(&entries).await?)
    }

    /// The one rate read of a trade.
    async fn trade_quote(&self, code: &CurrencyCode) -> Result<Quote, ExchangeError> {
        let quote = self.reader.lookup(code, &CurrencyCode::pivot()).await?;
        if !quote.fresh {
            if self.settings.reject_stale_trades {
                quote.check_fresh()?;
            }
            warn!(
                currency = %code,
                updated_at = %quote.updated_at,
                "Trading on a stale rate"
            );
        }
        Ok(quote)
    }

    fn check_trade_amount(&self, amount: f64) -> Result<(), ValidationError> {
        check_amount(amount)?;
        if amount < self.settings.min_trade_amount {
            return Err(ValidationError::BelowMinimum {
                amount,
                minimum: self.settings.min_trade_amount,
            });
        }
        Ok(())
    }
}

fn check_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() {
        return Err(ValidationError::NonFiniteAmount);
    }
    if amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{LedgerError, RateError};
    use crate::core::rate::RateEntry;
    use crate::store::KeyValueStore;
    use chrono::{DateTime, Duration};

    struct Fixture {
        exchange: Exchange,
        ledger: PortfolioLedger,
        rates: RateStore,
    }

    fn fixture(settings: ExchangeSettings) -> Fixture {
        let kv = KeyValueStore::in_memory();
        let rates = RateStore::open(&kv).unwrap();
        let ledger = PortfolioLedger::open(&kv).unwrap();
        let exchange = Exchange::new(
            CurrencyRegistry::builtin(),
            UserDirectory::open(&kv).unwrap(),
            ledger.clone(),
            RateReader::new(rates.clone(), Duration::seconds(300)),
            rates.clone(),
            settings,
        );
        Fixture {
            exchange,
            ledger,
            rates,
        }
    }

    async fn set_rates(rates: &RateStore, pairs: &[(&str, f64)], at: DateTime<Utc>) {
        let mut snapshot = RateStoreSnapshot::default();
        for (p, rate) in pairs {
            snapshot.pairs.insert(
                p.parse().unwrap(),
                RateEntry {
                    rate: *rate,
                    updated_at: at,
                    source: "test".into(),
                },
            );
        }
        rates.replace(&snapshot).await.unwrap();
    }

    fn code(raw: &str) -> CurrencyCode {
        CurrencyCode::parse(raw).unwrap()
    }

    async fn balance(ledger: &PortfolioLedger, user_id: u64, currency: &str) -> Option<f64> {
        ledger
            .load(user_id)
            .await
            .get_wallet(&code(currency))
            .ok()
            .map(|w| w.balance())
    }

    #[tokio::test]
    async fn test_buy_then_sell_round_trip() {
        let mut f = fixture(ExchangeSettings::default());
        set_rates(&f.rates, &[("BTC_USD", 45000.0)], Utc::now()).await;

        let alice = f.exchange.register("alice").await.unwrap();
        f.exchange.deposit(alice.user_id, "USD", 1000.0).await.unwrap();

        let bought = f.exchange.buy(alice.user_id, "btc", 0.01).await.unwrap();
        assert_eq!(bought.rate, 45000.0);
        assert!((bought.cost_usd - 450.0).abs() < 1e-9);
        assert_eq!(bought.new_balance, 0.01);
        assert!(bought.fresh);
        assert!((balance(&f.ledger, alice.user_id, "USD").await.unwrap() - 550.0).abs() < 1e-9);
        assert_eq!(balance(&f.ledger, alice.user_id, "BTC").await, Some(0.01));

        let sold = f.exchange.sell(alice.user_id, "BTC", 0.01).await.unwrap();
        assert_eq!(sold.old_balance, 0.01);
        assert_eq!(sold.new_balance, 0.0);
        assert!((sold.revenue_usd - 450.0).abs() < 1e-9);
        assert!((balance(&f.ledger, alice.user_id, "USD").await.unwrap() - 1000.0).abs() < 1e-9);
        assert_eq!(balance(&f.ledger, alice.user_id, "BTC").await, Some(0.0));
    }

    #[tokio::test]
    async fn test_buy_with_insufficient_usd_changes_nothing() {
        let mut f = fixture(ExchangeSettings::default());
        set_rates(&f.rates, &[("BTC_USD", 45000.0)], Utc::now()).await;
        f.exchange.deposit(1, "USD", 1000.0).await.unwrap();

        let err = f.exchange.buy(1, "BTC", 1.0).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Ledger(LedgerError::InsufficientFunds { ref currency, available, required })
                if currency == "USD" && available == 1000.0 && required == 45000.0
        ));
        assert_eq!(balance(&f.ledger, 1, "USD").await, Some(1000.0));
        assert_eq!(balance(&f.ledger, 1, "BTC").await, None);
    }

    #[tokio::test]
    async fn test_buy_without_usd_wallet_fails_insufficient() {
        let mut f = fixture(ExchangeSettings::default());
        set_rates(&f.rates, &[("ETH_USD", 2500.0)], Utc::now()).await;

        let err = f.exchange.buy(1, "ETH", 1.0).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Ledger(LedgerError::InsufficientFunds { available, .. }) if available == 0.0
        ));
        assert!(f.ledger.load(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_anything_else() {
        let mut f = fixture(ExchangeSettings::default());

        let cases = [
            ("BTC", 0.0),
            ("BTC", -1.0),
            ("BTC", f64::NAN),
            ("BTC", 0.00001),
            ("B!", 1.0),
            ("XYZ", 1.0),
            ("USD", 1.0),
        ];
        for (currency, amount) in cases {
            let err = f.exchange.buy(1, currency, amount).await.unwrap_err();
            assert!(
                matches!(err, ExchangeError::Validation(_)),
                "{currency} {amount}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_rate_is_unavailable() {
        let mut f = fixture(ExchangeSettings::default());
        f.exchange.deposit(1, "USD", 100.0).await.unwrap();

        let err = f.exchange.buy(1, "EUR", 10.0).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rate(RateError::Unavailable { .. })));
        assert_eq!(balance(&f.ledger, 1, "USD").await, Some(100.0));
    }

    #[tokio::test]
    async fn test_stale_rate_policy() {
        let stale_at = Utc::now() - Duration::minutes(10);

        let mut lenient = fixture(ExchangeSettings::default());
        set_rates(&lenient.rates, &[("EUR_USD", 1.25)], stale_at).await;
        lenient.exchange.deposit(1, "USD", 100.0).await.unwrap();
        let receipt = lenient.exchange.buy(1, "EUR", 40.0).await.unwrap();
        assert!(!receipt.fresh);
        assert!((receipt.usd_balance - 50.0).abs() < 1e-9);

        let mut strict = fixture(ExchangeSettings {
            reject_stale_trades: true,
            ..ExchangeSettings::default()
        });
        set_rates(&strict.rates, &[("EUR_USD", 1.25)], stale_at).await;
        strict.exchange.deposit(1, "USD", 100.0).await.unwrap();
        let err = strict.exchange.buy(1, "EUR", 40.0).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rate(RateError::Stale { .. })));
        assert_eq!(balance(&strict.ledger, 1, "USD").await, Some(100.0));
    }

    #[tokio::test]
    async fn test_sell_checks_wallet_before_rate() {
        let mut f = fixture(ExchangeSettings::default());

        let err = f.exchange.sell(1, "BTC", 0.5).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Ledger(LedgerError::WalletNotFound(_))));

        f.exchange.deposit(1, "BTC", 0.25).await.unwrap();
        let err = f.exchange.sell(1, "BTC", 0.5).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Ledger(LedgerError::InsufficientFunds { .. })
        ));

        // Enough balance but no rate: nothing is debited.
        let err = f.exchange.sell(1, "BTC", 0.1).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rate(RateError::Unavailable { .. })));
        assert_eq!(balance(&f.ledger, 1, "BTC").await, Some(0.25));
    }

    #[tokio::test]
    async fn test_sell_pivot_only_debits() {
        let mut f = fixture(ExchangeSettings::default());
        f.exchange.deposit(1, "USD", 300.0).await.unwrap();

        let receipt = f.exchange.sell(1, "USD", 120.0).await.unwrap();
        assert_eq!(receipt.rate, 1.0);
        assert_eq!(receipt.revenue_usd, 120.0);
        assert_eq!(receipt.old_balance, 300.0);
        assert_eq!(receipt.new_balance, 180.0);
        assert_eq!(balance(&f.ledger, 1, "USD").await, Some(180.0));
    }

    #[tokio::test]
    async fn test_buy_uses_derived_inverse_rate() {
        let mut f = fixture(ExchangeSettings::default());
        set_rates(&f.rates, &[("USD_EUR", 0.8)], Utc::now()).await;
        f.exchange.deposit(1, "USD", 100.0).await.unwrap();

        let receipt = f.exchange.buy(1, "EUR", 40.0).await.unwrap();
        assert!((receipt.rate - 1.25).abs() < 1e-12);
        assert!((receipt.cost_usd - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_register_creates_empty_portfolio() {
        let mut f = fixture(ExchangeSettings::default());
        let user = f.exchange.register("bob").await.unwrap();
        assert_eq!(user.user_id, 1);
        assert!(f.ledger.load(user.user_id).await.is_empty());

        assert!(matches!(
            f.exchange.register("bob").await,
            Err(ExchangeError::Validation(ValidationError::UsernameTaken(_)))
        ));
    }
}

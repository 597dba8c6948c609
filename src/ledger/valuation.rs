//! Portfolio valuation in a chosen base currency.

use crate::core::currency::CurrencyCode;
use crate::core::wallet::Portfolio;
use crate::rates::RateReader;
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct WalletValuation {
    pub currency: CurrencyCode,
    pub balance: f64,
    /// Rate into the base currency, `None` when no usable quote exists.
    pub rate: Option<f64>,
    pub value: Option<f64>,
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioValuation {
    pub base: CurrencyCode,
    pub wallets: Vec<WalletValuation>,
    /// Sum over priced wallets only.
    pub total: f64,
}

impl PortfolioValuation {
    pub fn unpriced(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.wallets
            .iter()
            .filter(|w| w.value.is_none())
            .map(|w| &w.currency)
    }

    pub fn has_stale_rates(&self) -> bool {
        self.wallets.iter().any(|w| w.value.is_some() && !w.fresh)
    }
}

/// Values every wallet in `base`. Wallets without a rate stay unpriced and out of the total.
pub async fn value_portfolio(
    portfolio: &Portfolio,
    reader: &RateReader,
    base: &CurrencyCode,
    now: DateTime<Utc>,
) -> PortfolioValuation {
    let mut wallets = Vec::new();
    let mut total = 0.0;

    for wallet in portfolio.wallets() {
        let currency = wallet.currency_code().clone();
        let valuation = match reader.convert_at(&currency, base, now).await {
            Ok(quote) => {
                let value = wallet.balance() * quote.rate;
                total += value;
                WalletValuation {
                    currency,
                    balance: wallet.balance(),
                    rate: Some(quote.rate),
                    value: Some(value),
                    fresh: quote.fresh,
                }
            }
            Err(e) => {
                debug!(%currency, %base, error = %e, "Wallet left unpriced");
                WalletValuation {
                    currency,
                    balance: wallet.balance(),
                    rate: None,
                    value: None,
                    fresh: false,
                }
            }
        };
        wallets.push(valuation);
    }

    PortfolioValuation {
        base: base.clone(),
        wallets,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::{RateEntry, RateStoreSnapshot};
    use crate::rates::RateStore;
    use crate::store::KeyValueStore;
    use chrono::Duration;

    fn code(raw: &str) -> CurrencyCode {
        CurrencyCode::parse(raw).unwrap()
    }

    async fn reader(pairs: &[(&str, f64, DateTime<Utc>)]) -> RateReader {
        let store = RateStore::open(&KeyValueStore::in_memory()).unwrap();
        let mut snapshot = RateStoreSnapshot::default();
        for (p, rate, at) in pairs {
            snapshot.pairs.insert(
                p.parse().unwrap(),
                RateEntry {
                    rate: *rate,
                    updated_at: *at,
                    source: "test".into(),
                },
            );
        }
        store.replace(&snapshot).await.unwrap();
        RateReader::new(store, Duration::seconds(300))
    }

    #[tokio::test]
    async fn test_value_in_usd_with_unpriced_wallet() {
        let now = Utc::now();
        let reader = reader(&[("BTC_USD", 40000.0, now)]).await;

        let mut portfolio = Portfolio::empty(1);
        portfolio.deposit(&code("USD"), 500.0).unwrap();
        portfolio.deposit(&code("BTC"), 0.5).unwrap();
        portfolio.deposit(&code("DOGE"), 100.0).unwrap();

        let valuation = value_portfolio(&portfolio, &reader, &code("USD"), now).await;
        assert_eq!(valuation.total, 20500.0);
        assert_eq!(valuation.unpriced().collect::<Vec<_>>(), vec![&code("DOGE")]);
        assert!(!valuation.has_stale_rates());
    }

    #[tokio::test]
    async fn test_value_in_other_base_through_pivot() {
        let now = Utc::now();
        let old = now - Duration::hours(1);
        let reader = reader(&[("BTC_USD", 40000.0, now), ("EUR_USD", 1.25, old)]).await;

        let mut portfolio = Portfolio::empty(1);
        portfolio.deposit(&code("BTC"), 1.0).unwrap();
        portfolio.deposit(&code("USD"), 125.0).unwrap();

        let valuation = value_portfolio(&portfolio, &reader, &code("EUR"), now).await;
        assert!((valuation.total - 32100.0).abs() < 1e-6);
        assert!(valuation.has_stale_rates());
        assert_eq!(valuation.unpriced().count(), 0);
    }
}

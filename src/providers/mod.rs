pub mod coingecko;
pub mod exchangerate;
pub mod util;

use crate::core::config::ProvidersConfig;
use crate::core::rate::RateProvider;
use anyhow::Result;
use coingecko::CoinGeckoProvider;
use exchangerate::ExchangeRateProvider;
use std::sync::Arc;

/// Providers enabled in `config`, in aggregation order.
pub fn build_all(config: &ProvidersConfig) -> Result<Vec<Arc<dyn RateProvider>>> {
    let mut providers: Vec<Arc<dyn RateProvider>> = Vec::new();
    if let Some(cfg) = &config.coingecko {
        providers.push(Arc::new(CoinGeckoProvider::new(cfg)?));
    }
    if let Some(cfg) = &config.exchangerate {
        providers.push(Arc::new(ExchangeRateProvider::new(cfg)?));
    }
    Ok(providers)
}

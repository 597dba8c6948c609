use crate::core::config::{EXCHANGERATE_KEY_ENV, ExchangeRateConfig};
use crate::core::currency::CurrencyCode;
use crate::core::error::ProviderError;
use crate::core::rate::{RatePair, RateProvider, is_valid_rate, reverse_rate};
use crate::providers::util::{fetch_json, http_client};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const NAME: &str = "exchangerate";

/// Fiat quotes from ExchangeRate-API, requested against USD.
pub struct ExchangeRateProvider {
    base_url: String,
    api_key: Option<String>,
    currencies: Vec<CurrencyCode>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    /// Units of each currency per one USD.
    #[serde(default)]
    conversion_rates: HashMap<String, Value>,
}

impl ExchangeRateProvider {
    pub fn new(config: &ExchangeRateConfig) -> Result<Self> {
        let currencies = config
            .currencies
            .iter()
            .map(|c| {
                CurrencyCode::parse(c)
                    .with_context(|| format!("Invalid currency code in exchangerate.currencies: {c}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            currencies,
            client: http_client(Duration::from_secs(config.timeout_secs))
                .context("Failed to build ExchangeRate-API HTTP client")?,
        })
    }
}

#[async_trait]
impl RateProvider for ExchangeRateProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch_rates(&self) -> Result<HashMap<RatePair, f64>, ProviderError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::new(
                NAME,
                format!("API key is not configured (set {EXCHANGERATE_KEY_ENV})"),
            ));
        };

        let url = format!("{}/{api_key}/latest/USD", self.base_url);
        debug!("Requesting fiat rates from {}/***/latest/USD", self.base_url);
        let response: LatestResponse = fetch_json(NAME, self.client.get(&url)).await?;

        if response.result != "success" {
            let reason = response
                .error_type
                .unwrap_or_else(|| format!("result '{}'", response.result));
            return Err(ProviderError::new(NAME, format!("API error: {reason}")));
        }

        let mut rates = HashMap::new();
        for code in &self.currencies {
            if code.is_pivot() {
                continue;
            }
            let Some(raw) = response.conversion_rates.get(code.as_str()) else {
                debug!(%code, "Currency missing from response");
                continue;
            };
            let Some(per_usd) = raw.as_f64().filter(|r| is_valid_rate(*r)) else {
                warn!(%code, rate = %raw, "Ignoring invalid conversion rate");
                continue;
            };
            // The API quotes CODE per USD; the store keeps the USD value of one CODE.
            rates.insert(RatePair::to_pivot(code.clone()), reverse_rate(per_usd));
        }

        debug!(count = rates.len(), "Fetched fiat rates");
        Ok(rates)
    }
}

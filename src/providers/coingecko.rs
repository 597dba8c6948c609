use crate::core::config::CoinGeckoConfig;
use crate::core::currency::CurrencyCode;
use crate::core::error::ProviderError;
use crate::core::rate::{RatePair, RateProvider, is_valid_rate};
use crate::providers::util::{fetch_json, http_client};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const NAME: &str = "coingecko";

/// Crypto quotes against USD from the CoinGecko simple-price endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    ids: Vec<(CurrencyCode, String)>,
    client: Client,
}

/// `{"bitcoin": {"usd": 45000.0}, ...}`. Entries stay untyped so one bad coin cannot reject the
/// whole body.
type SimplePriceResponse = HashMap<String, Value>;

impl CoinGeckoProvider {
    pub fn new(config: &CoinGeckoConfig) -> Result<Self> {
        let mut ids = Vec::with_capacity(config.ids.len());
        for (code, id) in &config.ids {
            let code = CurrencyCode::parse(code)
                .with_context(|| format!("Invalid currency code in coingecko.ids: {code}"))?;
            ids.push((code, id.clone()));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            ids,
            client: http_client(Duration::from_secs(config.timeout_secs))
                .context("Failed to build CoinGecko HTTP client")?,
        })
    }
}

#[async_trait]
impl RateProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch_rates(&self) -> Result<HashMap<RatePair, f64>, ProviderError> {
        if self.ids.is_empty() {
            return Err(ProviderError::new(NAME, "no coin ids configured"));
        }

        let ids = self
            .ids
            .iter()
            .map(|(_, id)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/simple/price?ids={ids}&vs_currencies=usd",
            self.base_url
        );
        debug!("Requesting crypto rates from {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }
        let response: SimplePriceResponse = fetch_json(NAME, request).await?;

        let mut rates = HashMap::new();
        for (code, id) in &self.ids {
            let Some(raw) = response.get(id).and_then(|prices| prices.get("usd")) else {
                debug!(%code, id, "No USD price in response");
                continue;
            };
            let Some(price) = raw.as_f64().filter(|p| is_valid_rate(*p)) else {
                warn!(%code, price = %raw, "Ignoring invalid price");
                continue;
            };
            rates.insert(RatePair::to_pivot(code.clone()), price);
        }

        debug!(count = rates.len(), "Fetched crypto rates");
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, ids: &[(&str, &str)]) -> CoinGeckoConfig {
        CoinGeckoConfig {
            base_url: base_url.to_string(),
            api_key: None,
            timeout_secs: 5,
            ids: ids
                .iter()
                .map(|(c, i)| (c.to_string(), i.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn pair(raw: &str) -> RatePair {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn test_successful_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin,ethereum"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"bitcoin": {"usd": 45000.5}, "ethereum": {"usd": 2500.0}}"#,
            ))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new(&config(
            &server.uri(),
            &[("BTC", "bitcoin"), ("ETH", "ethereum")],
        ))
        .unwrap();
        let rates = provider.fetch_rates().await.unwrap();

        assert_eq!(rates.len(), 2);
        assert_eq!(rates[&pair("BTC_USD")], 45000.5);
        assert_eq!(rates[&pair("ETH_USD")], 2500.0);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_prices_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"bitcoin": {"usd": 45000.0}, "dogecoin": {"usd": 0.0}, "cardano": {}}"#,
            ))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new(&config(
            &server.uri(),
            &[
                ("BTC", "bitcoin"),
                ("DOGE", "dogecoin"),
                ("ADA", "cardano"),
                ("SOL", "solana"),
            ],
        ))
        .unwrap();
        let rates = provider.fetch_rates().await.unwrap();

        assert_eq!(rates.len(), 1);
        assert!(rates.contains_key(&pair("BTC_USD")));
    }

    #[tokio::test]
    async fn test_null_and_non_numeric_prices_do_not_fail_the_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "bitcoin": {"usd": 45000.0},
                    "ethereum": {"usd": null},
                    "solana": {"usd": "n/a"},
                    "ripple": [],
                    "cardano": {"usd": 0.35, "last_updated_at": null}
                }"#,
            ))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new(&config(
            &server.uri(),
            &[
                ("BTC", "bitcoin"),
                ("ETH", "ethereum"),
                ("SOL", "solana"),
                ("XRP", "ripple"),
                ("ADA", "cardano"),
            ],
        ))
        .unwrap();
        let rates = provider.fetch_rates().await.unwrap();

        assert_eq!(rates.len(), 2);
        assert_eq!(rates[&pair("BTC_USD")], 45000.0);
        assert_eq!(rates[&pair("ADA_USD")], 0.35);
    }

    #[tokio::test]
    async fn test_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(header("x-cg-demo-api-key", "demo-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"bitcoin": {"usd": 1.0}}"#))
            .mount(&server)
            .await;

        let mut cfg = config(&server.uri(), &[("BTC", "bitcoin")]);
        cfg.api_key = Some("demo-key".to_string());
        let rates = CoinGeckoProvider::new(&cfg)
            .unwrap()
            .fetch_rates()
            .await
            .unwrap();
        assert_eq!(rates.len(), 1);
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new(&config(&server.uri(), &[("BTC", "bitcoin")])).unwrap();
        let err = provider.fetch_rates().await.unwrap_err();
        assert_eq!(err.provider, NAME);
        assert!(err.reason.contains("429"));
    }

    #[test]
    fn test_invalid_code_in_config() {
        assert!(CoinGeckoProvider::new(&config("http://localhost", &[("B-C", "bitcoin")])).is_err());
    }
}

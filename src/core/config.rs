use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const COINGECKO_KEY_ENV: &str = "VTRADE_COINGECKO_API_KEY";
pub const EXCHANGERATE_KEY_ENV: &str = "VTRADE_EXCHANGERATE_API_KEY";

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Currency code to CoinGecko coin id.
    #[serde(default = "CoinGeckoConfig::default_ids")]
    pub ids: BTreeMap<String, String>,
}

impl CoinGeckoConfig {
    fn default_ids() -> BTreeMap<String, String> {
        [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("BNB", "binancecoin"),
            ("ADA", "cardano"),
            ("SOL", "solana"),
            ("XRP", "ripple"),
            ("DOT", "polkadot"),
            ("DOGE", "dogecoin"),
        ]
        .into_iter()
        .map(|(code, id)| (code.to_string(), id.to_string()))
        .collect()
    }
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            ids: Self::default_ids(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeRateConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "ExchangeRateConfig::default_currencies")]
    pub currencies: Vec<String>,
}

impl ExchangeRateConfig {
    fn default_currencies() -> Vec<String> {
        ["EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "RUB", "CNY"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            currencies: Self::default_currencies(),
        }
    }
}

/// Quote sources in aggregation order. A missing section disables that source.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoConfig>,
    pub exchangerate: Option<ExchangeRateConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoConfig::default()),
            exchangerate: Some(ExchangeRateConfig::default()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data_path: Option<String>,
    pub base_currency: String,
    pub rates_ttl_seconds: u64,
    pub min_trade_amount: f64,
    pub reject_stale_trades: bool,
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            base_currency: "USD".to_string(),
            rates_ttl_seconds: 300,
            min_trade_amount: 0.0001,
            reject_stale_trades: false,
            providers: ProvidersConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the default config file, or defaults when there is none.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default().with_env_overrides());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "vtrade", "vtrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "vtrade", "vtrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        self.with_api_keys(
            std::env::var(COINGECKO_KEY_ENV).ok(),
            std::env::var(EXCHANGERATE_KEY_ENV).ok(),
        )
    }

    /// Keys given here win over the ones from the file.
    pub fn with_api_keys(
        mut self,
        coingecko: Option<String>,
        exchangerate: Option<String>,
    ) -> Self {
        if let (Some(cfg), Some(key)) = (self.providers.coingecko.as_mut(), coingecko) {
            cfg.api_key = Some(key);
        }
        if let (Some(cfg), Some(key)) = (self.providers.exchangerate.as_mut(), exchangerate) {
            cfg.api_key = Some(key);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.rates_ttl_seconds, 300);
        assert_eq!(config.base_currency, "USD");
        assert!(!config.reject_stale_trades);

        let coingecko = config.providers.coingecko.unwrap();
        assert_eq!(coingecko.ids["BTC"], "bitcoin");
        assert_eq!(coingecko.timeout_secs, 10);
        assert_eq!(config.providers.exchangerate.unwrap().currencies.len(), 8);
    }

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
data_path: /tmp/vtrade
base_currency: EUR
rates_ttl_seconds: 60
min_trade_amount: 0.01
reject_stale_trades: true
providers:
  coingecko:
    base_url: "http://example.com/cg"
    ids:
      BTC: bitcoin
  exchangerate:
    base_url: "http://example.com/er"
    api_key: "file-key"
    timeout_secs: 3
    currencies: [EUR]
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.data_path.as_deref(), Some("/tmp/vtrade"));
        assert_eq!(config.base_currency, "EUR");
        assert_eq!(config.rates_ttl_seconds, 60);
        assert_eq!(config.min_trade_amount, 0.01);
        assert!(config.reject_stale_trades);

        let coingecko = config.providers.coingecko.unwrap();
        assert_eq!(coingecko.base_url, "http://example.com/cg");
        assert_eq!(coingecko.ids.len(), 1);
        assert_eq!(coingecko.timeout_secs, 10);

        let exchangerate = config.providers.exchangerate.unwrap();
        assert_eq!(exchangerate.api_key.as_deref(), Some("file-key"));
        assert_eq!(exchangerate.timeout_secs, 3);
        assert_eq!(exchangerate.currencies, vec!["EUR".to_string()]);
    }

    #[test]
    fn test_disabled_provider_section() {
        let config: AppConfig = serde_yaml::from_str("providers:\n  coingecko: null\n").unwrap();
        assert!(config.providers.coingecko.is_none());
        assert!(config.providers.exchangerate.is_none());
    }

    #[test]
    fn test_api_key_overrides() {
        let config = AppConfig::default().with_api_keys(Some("cg".into()), None);
        assert_eq!(
            config.providers.coingecko.unwrap().api_key.as_deref(),
            Some("cg")
        );
        assert!(config.providers.exchangerate.unwrap().api_key.is_none());
    }

    #[test]
    fn test_load_from_path_reports_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "rates_ttl_seconds: [not a number").unwrap();

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        assert!(AppConfig::load_from_path("/nonexistent/vtrade.yaml").is_err());
    }
}

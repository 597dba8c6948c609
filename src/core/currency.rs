//! Currency codes and the static registry of supported currencies.

use crate::core::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// The currency every trade is routed through.
pub const PIVOT: &str = "USD";

/// A validated 2-5 character uppercase currency identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let code = raw.trim().to_ascii_uppercase();
        let invalid = |reason| ValidationError::InvalidCode {
            code: raw.to_string(),
            reason,
        };

        if code.len() < 2 || code.len() > 5 {
            return Err(invalid("must be 2 to 5 characters"));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("must contain only letters and digits"));
        }
        Ok(Self(code))
    }

    pub fn pivot() -> Self {
        Self(PIVOT.to_string())
    }

    pub fn is_pivot(&self) -> bool {
        self.0 == PIVOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Kind-specific metadata; dispatch on this instead of on types.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrencyKind {
    Fiat { issuing_country: &'static str },
    Crypto { algorithm: &'static str, market_cap: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Currency {
    pub code: CurrencyCode,
    pub name: &'static str,
    pub kind: CurrencyKind,
}

impl Currency {
    fn fiat(code: &str, name: &'static str, issuing_country: &'static str) -> Self {
        Self {
            code: CurrencyCode(code.to_string()),
            name,
            kind: CurrencyKind::Fiat { issuing_country },
        }
    }

    fn crypto(code: &str, name: &'static str, algorithm: &'static str, market_cap: f64) -> Self {
        Self {
            code: CurrencyCode(code.to_string()),
            name,
            kind: CurrencyKind::Crypto {
                algorithm,
                market_cap,
            },
        }
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self.kind, CurrencyKind::Crypto { .. })
    }

    /// One-line description used by listings.
    pub fn display_info(&self) -> String {
        match &self.kind {
            CurrencyKind::Fiat { issuing_country } => {
                format!("[FIAT] {} — {} (Issuing: {issuing_country})", self.code, self.name)
            }
            CurrencyKind::Crypto {
                algorithm,
                market_cap,
            } => {
                let mcap = if *market_cap > 0.0 {
                    format!("{market_cap:.2e}")
                } else {
                    "N/A".to_string()
                };
                format!(
                    "[CRYPTO] {} — {} (Algo: {algorithm}, MCAP: {mcap})",
                    self.code, self.name
                )
            }
        }
    }
}

/// Flat lookup table of supported currencies, keyed by code.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencyCode, Currency>,
}

impl CurrencyRegistry {
    pub fn builtin() -> Self {
        let currencies = [
            Currency::fiat("USD", "US Dollar", "United States"),
            Currency::fiat("EUR", "Euro", "Eurozone"),
            Currency::fiat("GBP", "British Pound", "United Kingdom"),
            Currency::fiat("JPY", "Japanese Yen", "Japan"),
            Currency::fiat("CHF", "Swiss Franc", "Switzerland"),
            Currency::fiat("CAD", "Canadian Dollar", "Canada"),
            Currency::fiat("AUD", "Australian Dollar", "Australia"),
            Currency::fiat("RUB", "Russian Ruble", "Russia"),
            Currency::fiat("CNY", "Chinese Yuan", "China"),
            Currency::crypto("BTC", "Bitcoin", "SHA-256", 1.12e12),
            Currency::crypto("ETH", "Ethereum", "Ethash", 4.2e11),
            Currency::crypto("BNB", "Binance Coin", "BEP-20", 8.5e10),
            Currency::crypto("ADA", "Cardano", "Ouroboros", 3.2e10),
            Currency::crypto("SOL", "Solana", "Proof of History", 7.8e10),
            Currency::crypto("XRP", "Ripple", "XRP Ledger", 4.5e10),
            Currency::crypto("DOT", "Polkadot", "Nominated Proof-of-Stake", 2.9e10),
            Currency::crypto("DOGE", "Dogecoin", "Scrypt", 2.3e10),
        ];

        Self {
            currencies: currencies
                .into_iter()
                .map(|c| (c.code.clone(), c))
                .collect(),
        }
    }

    /// Parses `raw` and checks it against the registry.
    pub fn resolve(&self, raw: &str) -> Result<&Currency, ValidationError> {
        let code = CurrencyCode::parse(raw)?;
        self.currencies
            .get(&code)
            .ok_or_else(|| ValidationError::UnknownCurrency(code.to_string()))
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<&Currency> {
        self.currencies.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_normalization_and_validation() {
        assert_eq!(CurrencyCode::parse(" btc ").unwrap().as_str(), "BTC");
        assert_eq!(CurrencyCode::parse("doge").unwrap().as_str(), "DOGE");

        assert!(matches!(
            CurrencyCode::parse("X"),
            Err(ValidationError::InvalidCode { .. })
        ));
        assert!(matches!(
            CurrencyCode::parse("TOOLONG"),
            Err(ValidationError::InvalidCode { .. })
        ));
        assert!(matches!(
            CurrencyCode::parse("U D"),
            Err(ValidationError::InvalidCode { .. })
        ));
    }

    #[test]
    fn test_code_serde_rejects_invalid_codes() {
        let code: CurrencyCode = serde_json::from_str("\"eth\"").unwrap();
        assert_eq!(code.as_str(), "ETH");
        assert!(serde_json::from_str::<CurrencyCode>("\"E\"").is_err());
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"ETH\"");
    }

    #[test]
    fn test_registry_resolves_known_codes() {
        let registry = CurrencyRegistry::builtin();
        assert_eq!(registry.iter().count(), 17);

        let btc = registry.resolve("btc").unwrap();
        assert!(btc.is_crypto());
        assert_eq!(btc.name, "Bitcoin");

        let eur = registry.resolve("EUR").unwrap();
        assert!(!eur.is_crypto());

        assert_eq!(
            registry.resolve("XYZ"),
            Err(ValidationError::UnknownCurrency("XYZ".to_string()))
        );
    }

    #[test]
    fn test_display_info_per_kind() {
        let registry = CurrencyRegistry::builtin();
        assert_eq!(
            registry.resolve("EUR").unwrap().display_info(),
            "[FIAT] EUR — Euro (Issuing: Eurozone)"
        );
        assert_eq!(
            registry.resolve("BTC").unwrap().display_info(),
            "[CRYPTO] BTC — Bitcoin (Algo: SHA-256, MCAP: 1.12e12)"
        );
    }
}

pub mod cli;
pub mod core;
pub mod exchange;
pub mod ledger;
pub mod providers;
pub mod rates;
pub mod store;

use crate::cli::{portfolio as portfolio_view, rates as rates_view, ui};
use crate::core::config::AppConfig;
use crate::core::currency::{CurrencyCode, CurrencyRegistry};
use crate::core::error::ValidationError;
use crate::core::rate::RatePair;
use crate::exchange::audit::{Action, AuditContext, audited};
use crate::exchange::{Exchange, ExchangeHandle, ExchangeService, ExchangeSettings};
use crate::ledger::{PortfolioLedger, UserDirectory, value_portfolio};
use crate::rates::{RateAggregator, RateReader, RateStore};
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Currencies,
    Register {
        username: String,
    },
    Deposit {
        user: String,
        currency: String,
        amount: f64,
    },
    Buy {
        user: String,
        currency: String,
        amount: f64,
    },
    Sell {
        user: String,
        currency: String,
        amount: f64,
    },
    ShowPortfolio {
        user: String,
        base: Option<String>,
    },
    UpdateRates {
        sources: Vec<String>,
    },
    ShowRates {
        currency: Option<String>,
        top: Option<usize>,
    },
    GetRate {
        from: String,
        to: String,
    },
    History {
        pair: Option<String>,
        limit: usize,
    },
}

/// Every component wired together for one process.
pub struct App {
    config: AppConfig,
    registry: CurrencyRegistry,
    rates: RateStore,
    reader: RateReader,
    users: UserDirectory,
    ledger: PortfolioLedger,
    aggregator: RateAggregator,
    exchange: ExchangeHandle,
    service: JoinHandle<()>,
    // Dropped last; a persistent store keeps the data directory locked while it lives.
    _store: KeyValueStore,
}

impl App {
    /// Opens the persistent store under the configured data path.
    pub fn open(config: AppConfig) -> Result<Self> {
        let data_path = config.default_data_path()?;
        debug!(path = %data_path.display(), "Opening data directory");
        let store = KeyValueStore::open(&data_path)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: KeyValueStore) -> Result<Self> {
        let registry = CurrencyRegistry::builtin();
        registry
            .resolve(&config.base_currency)
            .context("Invalid base_currency in config")?;
        let ttl = i64::try_from(config.rates_ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .context("rates_ttl_seconds is out of range")?;

        let rates = RateStore::open(&store)?;
        let reader = RateReader::new(rates.clone(), ttl);
        let users = UserDirectory::open(&store)?;
        let ledger = PortfolioLedger::open(&store)?;
        let aggregator = RateAggregator::new(providers::build_all(&config.providers)?);

        let exchange = Exchange::new(
            registry.clone(),
            users.clone(),
            ledger.clone(),
            reader.clone(),
            rates.clone(),
            ExchangeSettings::from_config(&config),
        );
        let (handle, service) = ExchangeService::spawn(exchange);

        Ok(Self {
            config,
            registry,
            rates,
            reader,
            users,
            ledger,
            aggregator,
            exchange: handle,
            service,
            _store: store,
        })
    }

    pub fn exchange(&self) -> &ExchangeHandle {
        &self.exchange
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn rates(&self) -> &RateStore {
        &self.rates
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    async fn user_id(&self, username: &str) -> Result<u64> {
        let user = self
            .users
            .find(username)
            .await
            .ok_or_else(|| ValidationError::UnknownUser(username.to_string()))
            .with_context(|| format!("Register first with `vtrade register {username}`"))?;
        Ok(user.user_id)
    }

    /// Runs one command and returns what should be shown to the user.
    pub async fn execute(&self, command: AppCommand) -> Result<String> {
        match command {
            AppCommand::Currencies => Ok(portfolio_view::render_currencies(&self.registry)),
            AppCommand::Register { username } => {
                let user = self.exchange.register(&username).await?;
                Ok(portfolio_view::render_registered(&user))
            }
            AppCommand::Deposit {
                user,
                currency,
                amount,
            } => {
                let user_id = self.user_id(&user).await?;
                let receipt = self.exchange.deposit(user_id, &currency, amount).await?;
                Ok(portfolio_view::render_deposit(&receipt))
            }
            AppCommand::Buy {
                user,
                currency,
                amount,
            } => {
                let user_id = self.user_id(&user).await?;
                let receipt = self
                    .exchange
                    .buy(user_id, &currency, amount)
                    .await
                    .with_context(|| format!("Failed to buy {amount} {currency}"))?;
                Ok(portfolio_view::render_buy(&receipt))
            }
            AppCommand::Sell {
                user,
                currency,
                amount,
            } => {
                let user_id = self.user_id(&user).await?;
                let receipt = self
                    .exchange
                    .sell(user_id, &currency, amount)
                    .await
                    .with_context(|| format!("Failed to sell {amount} {currency}"))?;
                Ok(portfolio_view::render_sell(&receipt))
            }
            AppCommand::ShowPortfolio { user, base } => {
                let user_id = self.user_id(&user).await?;
                let base = base.as_deref().unwrap_or(&self.config.base_currency);
                let base = self.registry.resolve(base)?.code.clone();

                let portfolio = self.ledger.load(user_id).await;
                let valuation = value_portfolio(&portfolio, &self.reader, &base, Utc::now()).await;
                Ok(valuation.display_as_table(&user))
            }
            AppCommand::UpdateRates { sources } => {
                let spinner = ui::new_spinner("Fetching exchange rates...");
                let report = audited(
                    Action::UpdateRates,
                    AuditContext::default(),
                    self.aggregator.run(&self.exchange, &sources),
                )
                .await;
                spinner.finish_and_clear();
                Ok(rates_view::render_update_report(
                    &report.context("Failed to update rates")?,
                ))
            }
            AppCommand::ShowRates { currency, top } => {
                let currency = currency.as_deref().map(CurrencyCode::parse).transpose()?;
                let snapshot = self.rates.snapshot().await;
                Ok(rates_view::render_rates(
                    &snapshot,
                    currency.as_ref(),
                    top,
                    self.reader.ttl(),
                    Utc::now(),
                ))
            }
            AppCommand::GetRate { from, to } => {
                let from = self.registry.resolve(&from)?.code.clone();
                let to = self.registry.resolve(&to)?.code.clone();
                let quote = self.reader.convert_at(&from, &to, Utc::now()).await?;
                Ok(rates_view::render_quote(&quote))
            }
            AppCommand::History { pair, limit } => {
                let pair = pair.as_deref().map(str::parse::<RatePair>).transpose()?;
                let entries = self.rates.history(pair.as_ref(), limit).await;
                Ok(rates_view::render_history(&entries))
            }
        }
    }

    /// Stops the exchange service after it has applied every queued command.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            exchange,
            service,
            _store,
            ..
        } = self;
        drop(exchange);
        service
            .await
            .context("Exchange service terminated abnormally")
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("vtrade starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(
        data_path = ?config.data_path,
        ttl = config.rates_ttl_seconds,
        "Loaded config"
    );

    let app = App::open(config)?;
    let result = app.execute(command).await;
    app.shutdown().await?;

    println!("{}", result?);
    Ok(())
}

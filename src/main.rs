use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use vtrade::AppCommand;
use vtrade::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Registered username to act as
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List supported currencies
    Currencies,
    /// Register a new user with an empty portfolio
    Register { username: String },
    /// Add funds to a wallet
    Deposit { currency: String, amount: f64 },
    /// Buy a currency with USD
    Buy { currency: String, amount: f64 },
    /// Sell a currency for USD
    Sell { currency: String, amount: f64 },
    /// Display wallets valued in a base currency
    ShowPortfolio {
        /// Base currency, defaults to the configured one
        base: Option<String>,
    },
    /// Fetch fresh rates from the configured sources
    UpdateRates {
        /// Sources to query, in merge order; all when omitted
        sources: Vec<String>,
    },
    /// Display cached rates
    ShowRates {
        /// Only pairs involving this currency
        currency: Option<String>,
        /// Only the N highest rates
        #[arg(long)]
        top: Option<usize>,
    },
    /// Display the rate between two currencies
    GetRate { from: String, to: String },
    /// Display recorded rate history
    History {
        /// Pair such as BTC_USD
        pair: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

impl Commands {
    fn into_app_command(self, user: Option<String>) -> Result<AppCommand> {
        let require_user = move || user.context("This command needs --user <USERNAME>");
        Ok(match self {
            Commands::Setup => unreachable!("Setup command should be handled separately"),
            Commands::Currencies => AppCommand::Currencies,
            Commands::Register { username } => AppCommand::Register { username },
            Commands::Deposit { currency, amount } => AppCommand::Deposit {
                user: require_user()?,
                currency,
                amount,
            },
            Commands::Buy { currency, amount } => AppCommand::Buy {
                user: require_user()?,
                currency,
                amount,
            },
            Commands::Sell { currency, amount } => AppCommand::Sell {
                user: require_user()?,
                currency,
                amount,
            },
            Commands::ShowPortfolio { base } => AppCommand::ShowPortfolio {
                user: require_user()?,
                base,
            },
            Commands::UpdateRates { sources } => AppCommand::UpdateRates { sources },
            Commands::ShowRates { currency, top } => AppCommand::ShowRates { currency, top },
            Commands::GetRate { from, to } => AppCommand::GetRate { from, to },
            Commands::History { pair, limit } => AppCommand::History { pair, limit },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => vtrade::cli::setup::setup(),
        Some(cmd) => match cmd.into_app_command(cli.user) {
            Ok(command) => vtrade::run_command(command, cli.config_path.as_deref()).await,
            Err(e) => Err(e),
        },
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

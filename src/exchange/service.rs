use crate::core::error::ExchangeError;
use crate::core::rate::{HistoryEntry, RateStoreSnapshot};
use crate::exchange::audit::{Action, AuditContext, audited};
use crate::exchange::engine::{BuyReceipt, DepositReceipt, Exchange, SellReceipt};
use crate::ledger::User;
use crate::rates::RateSink;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, ExchangeError>>;

enum Command {
    Register {
        username: String,
        reply: Reply<User>,
    },
    Deposit {
        user_id: u64,
        currency: String,
        amount: f64,
        reply: Reply<DepositReceipt>,
    },
    Buy {
        user_id: u64,
        currency: String,
        amount: f64,
        reply: Reply<BuyReceipt>,
    },
    Sell {
        user_id: u64,
        currency: String,
        amount: f64,
        reply: Reply<SellReceipt>,
    },
    ReplaceSnapshot {
        snapshot: RateStoreSnapshot,
        reply: Reply<()>,
    },
    AppendHistory {
        entries: Vec<HistoryEntry>,
        reply: Reply<()>,
    },
}

/// Task that owns the [`Exchange`] and applies commands one at a time.
pub struct ExchangeService {
    exchange: Exchange,
    commands: mpsc::Receiver<Command>,
}

impl ExchangeService {
    /// Starts the service. It stops once every handle has been dropped.
    pub fn spawn(exchange: Exchange) -> (ExchangeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let service = Self {
            exchange,
            commands: rx,
        };
        let task = tokio::spawn(service.run());
        (ExchangeHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        debug!("Exchange service started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
        }
        debug!("Exchange service stopped");
    }

    // A dropped reply receiver means the caller gave up; the mutation still stands.
    async fn handle(&mut self, command: Command) {
        let exchange = &mut self.exchange;
        match command {
            Command::Register { username, reply } => {
                let ctx = AuditContext {
                    username: Some(username.clone()),
                    ..Default::default()
                };
                let result = audited(Action::Register, ctx, exchange.register(&username)).await;
                let _ = reply.send(result);
            }
            Command::Deposit {
                user_id,
                currency,
                amount,
                reply,
            } => {
                let ctx = AuditContext::trade(user_id, &currency, amount);
                let result = audited(
                    Action::Deposit,
                    ctx,
                    exchange.deposit(user_id, &currency, amount),
                )
                .await;
                let _ = reply.send(result);
            }
            Command::Buy {
                user_id,
                currency,
                amount,
                reply,
            } => {
                let ctx = AuditContext::trade(user_id, &currency, amount);
                let result =
                    audited(Action::Buy, ctx, exchange.buy(user_id, &currency, amount)).await;
                let _ = reply.send(result);
            }
            Command::Sell {
                user_id,
                currency,
                amount,
                reply,
            } => {
                let ctx = AuditContext::trade(user_id, &currency, amount);
                let result =
                    audited(Action::Sell, ctx, exchange.sell(user_id, &currency, amount)).await;
                let _ = reply.send(result);
            }
            Command::ReplaceSnapshot { snapshot, reply } => {
                let _ = reply.send(exchange.replace_snapshot(snapshot).await);
            }
            Command::AppendHistory { entries, reply } => {
                let _ = reply.send(exchange.append_history(entries).await);
            }
        }
    }
}

/// Cloneable front door to the [`ExchangeService`].
#[derive(Clone)]
pub struct ExchangeHandle {
    commands: mpsc::Sender<Command>,
}

impl ExchangeHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ExchangeError::ServiceClosed)?;
        response.await.map_err(|_| ExchangeError::ServiceClosed)?
    }

    pub async fn register(&self, username: &str) -> Result<User, ExchangeError> {
        let username = username.to_string();
        self.request(|reply| Command::Register { username, reply })
            .await
    }

    pub async fn deposit(
        &self,
        user_id: u64,
        currency: &str,
        amount: f64,
    ) -> Result<DepositReceipt, ExchangeError> {
        let currency = currency.to_string();
        self.request(|reply| Command::Deposit {
            user_id,
            currency,
            amount,
            reply,
        })
        .await
    }

    pub async fn buy(
        &self,
        user_id: u64,
        currency: &str,
        amount: f64,
    ) -> Result<BuyReceipt, ExchangeError> {
        let currency = currency.to_string();
        self.request(|reply| Command::Buy {
            user_id,
            currency,
            amount,
            reply,
        })
        .await
    }

    pub async fn sell(
        &self,
        user_id: u64,
        currency: &str,
        amount: f64,
    ) -> Result<SellReceipt, ExchangeError> {
        let currency = currency.to_string();
        self.request(|reply| Command::Sell {
            user_id,
            currency,
            amount,
            reply,
        })
        .await
    }
}

#[async_trait]
impl RateSink for ExchangeHandle {
    async fn replace_snapshot(&self, snapshot: RateStoreSnapshot) -> Result<(), ExchangeError> {
        self.request(|reply| Command::ReplaceSnapshot { snapshot, reply })
            .await
    }

    async fn append_history(&self, entries: Vec<HistoryEntry>) -> Result<(), ExchangeError> {
        self.request(|reply| Command::AppendHistory { entries, reply })
            .await
    }
}

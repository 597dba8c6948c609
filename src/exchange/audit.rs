//! One structured event per core mutation.

use crate::core::error::{AggregationError, ExchangeError};
use crate::exchange::engine::{BuyReceipt, DepositReceipt, SellReceipt};
use crate::ledger::User;
use crate::rates::AggregationReport;
use std::fmt::Display;
use std::future::Future;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Register,
    Deposit,
    Buy,
    Sell,
    UpdateRates,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Register => "REGISTER",
            Action::Deposit => "DEPOSIT",
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::UpdateRates => "UPDATE_RATES",
        }
    }
}

/// Inputs recorded with every audit event.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<f64>,
}

impl AuditContext {
    pub fn trade(user_id: u64, currency: &str, amount: f64) -> Self {
        Self {
            user_id: Some(user_id),
            currency: Some(currency.to_string()),
            amount: Some(amount),
            ..Default::default()
        }
    }
}

/// Result fields worth keeping in the audit trail.
pub trait AuditRecord {
    fn audit_summary(&self) -> String;
}

/// Lets the audit level distinguish rejected requests from broken infrastructure.
pub trait AuditFailure: Display {
    fn is_rejection(&self) -> bool;
}

impl AuditFailure for ExchangeError {
    fn is_rejection(&self) -> bool {
        ExchangeError::is_rejection(self)
    }
}

impl AuditFailure for AggregationError {
    fn is_rejection(&self) -> bool {
        !matches!(self, AggregationError::Commit(_))
    }
}

/// Runs `operation` and records its outcome under `action`.
pub async fn audited<T, E, F>(action: Action, ctx: AuditContext, operation: F) -> Result<T, E>
where
    T: AuditRecord,
    E: AuditFailure,
    F: Future<Output = Result<T, E>>,
{
    let result = operation.await;
    let action = action.as_str();
    match &result {
        Ok(record) => info!(
            action,
            user_id = ?ctx.user_id,
            username = ?ctx.username,
            currency = ?ctx.currency,
            amount = ?ctx.amount,
            outcome = "success",
            result = %record.audit_summary(),
            "Action completed"
        ),
        Err(e) if e.is_rejection() => warn!(
            action,
            user_id = ?ctx.user_id,
            username = ?ctx.username,
            currency = ?ctx.currency,
            amount = ?ctx.amount,
            outcome = "rejected",
            error = %e,
            "Action rejected"
        ),
        Err(e) => error!(
            action,
            user_id = ?ctx.user_id,
            username = ?ctx.username,
            currency = ?ctx.currency,
            amount = ?ctx.amount,
            outcome = "failed",
            error = %e,
            "Action failed"
        ),
    }
    result
}

impl AuditRecord for User {
    fn audit_summary(&self) -> String {
        format!("user_id={} username={}", self.user_id, self.username)
    }
}

impl AuditRecord for DepositReceipt {
    fn audit_summary(&self) -> String {
        format!("new_balance={:.8} {}", self.new_balance, self.currency)
    }
}

impl AuditRecord for BuyReceipt {
    fn audit_summary(&self) -> String {
        format!(
            "rate={} cost_usd={:.2} new_balance={:.8} usd_balance={:.2} fresh={}",
            self.rate, self.cost_usd, self.new_balance, self.usd_balance, self.fresh
        )
    }
}

impl AuditRecord for SellReceipt {
    fn audit_summary(&self) -> String {
        format!(
            "rate={} revenue_usd={:.2} old_balance={:.8} new_balance={:.8} fresh={}",
            self.rate, self.revenue_usd, self.old_balance, self.new_balance, self.fresh
        )
    }
}

impl AuditRecord for AggregationReport {
    fn audit_summary(&self) -> String {
        let sources = self
            .sources
            .iter()
            .map(|(name, status)| format!("{name}:{}", if status.is_success() { "ok" } else { "error" }))
            .collect::<Vec<_>>()
            .join(",");
        format!("total_rates={} sources={sources}", self.total_rates)
    }
}

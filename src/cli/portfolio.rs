use super::ui;
use crate::core::currency::CurrencyRegistry;
use crate::exchange::{BuyReceipt, DepositReceipt, SellReceipt};
use crate::ledger::{PortfolioValuation, User};
use comfy_table::Cell;

const STALE_NOTE: &str = "Note: traded on a stale rate; run `vtrade update-rates` to refresh.";

impl PortfolioValuation {
    pub fn display_as_table(&self, username: &str) -> String {
        let mut output = format!(
            "Portfolio: {}\n\n",
            ui::style_text(username, ui::StyleType::Title)
        );
        if self.wallets.is_empty() {
            output.push_str(&ui::style_text(
                "No wallets yet. Use `vtrade deposit` to fund the account.",
                ui::StyleType::Subtle,
            ));
            return output;
        }

        let base = &self.base;
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Currency"),
            ui::header_cell("Balance"),
            ui::header_cell(&format!("Rate ({base})")),
            ui::header_cell(&format!("Value ({base})")),
        ]);
        for wallet in &self.wallets {
            table.add_row(vec![
                Cell::new(wallet.currency.to_string()),
                ui::number_cell(ui::format_amount(wallet.balance)),
                ui::format_optional_cell(wallet.rate, |r| format!("{r:.6}")),
                ui::format_optional_cell(wallet.value, |v| format!("{v:.2}")),
            ]);
        }
        output.push_str(&table.to_string());

        output.push_str(&format!(
            "\n\nTotal Value ({}): {}",
            ui::style_text(base.as_str(), ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", self.total), ui::StyleType::TotalValue)
        ));

        let unpriced: Vec<String> = self.unpriced().map(|c| c.to_string()).collect();
        if !unpriced.is_empty() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("Not priced (no rate): {}", unpriced.join(", ")),
                    ui::StyleType::Error
                )
            ));
        }
        if self.has_stale_rates() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    "Some values use stale rates; run `vtrade update-rates` to refresh.",
                    ui::StyleType::Warning
                )
            ));
        }
        output
    }
}

pub fn render_registered(user: &User) -> String {
    format!(
        "Registered {} with id {}",
        ui::style_text(&user.username, ui::StyleType::TotalLabel),
        user.user_id
    )
}

pub fn render_deposit(receipt: &DepositReceipt) -> String {
    format!(
        "Deposited {} {currency}. New balance: {} {currency}",
        ui::format_amount(receipt.amount),
        ui::style_text(&ui::format_amount(receipt.new_balance), ui::StyleType::TotalValue),
        currency = receipt.currency,
    )
}

pub fn render_buy(receipt: &BuyReceipt) -> String {
    let mut output = format!(
        "Bought {} {currency} at {:.6} USD/{currency} for {:.2} USD\n",
        ui::format_amount(receipt.amount),
        receipt.rate,
        receipt.cost_usd,
        currency = receipt.currency,
    );
    output.push_str(&format!(
        "{currency} balance: {}\nUSD balance: {:.2}",
        ui::style_text(&ui::format_amount(receipt.new_balance), ui::StyleType::TotalValue),
        receipt.usd_balance,
        currency = receipt.currency,
    ));
    if !receipt.fresh {
        output.push_str(&format!("\n{}", ui::style_text(STALE_NOTE, ui::StyleType::Warning)));
    }
    output
}

pub fn render_sell(receipt: &SellReceipt) -> String {
    let mut output = format!(
        "Sold {} {currency} at {:.6} USD/{currency} for {:.2} USD\n",
        ui::format_amount(receipt.amount),
        receipt.rate,
        receipt.revenue_usd,
        currency = receipt.currency,
    );
    output.push_str(&format!(
        "{currency} balance: {} -> {}",
        ui::format_amount(receipt.old_balance),
        ui::style_text(&ui::format_amount(receipt.new_balance), ui::StyleType::TotalValue),
        currency = receipt.currency,
    ));
    if !receipt.fresh {
        output.push_str(&format!("\n{}", ui::style_text(STALE_NOTE, ui::StyleType::Warning)));
    }
    output
}

pub fn render_currencies(registry: &CurrencyRegistry) -> String {
    let (crypto, fiat): (Vec<_>, Vec<_>) = registry.iter().partition(|c| c.is_crypto());
    let mut output = format!("{}\n", ui::style_text("Supported currencies", ui::StyleType::Title));
    for currency in fiat.iter().chain(crypto.iter()) {
        output.push_str(&format!("\n  {}", currency.display_info()));
    }
    output
}

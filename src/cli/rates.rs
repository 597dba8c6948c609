use super::ui;
use crate::core::currency::CurrencyCode;
use crate::core::rate::{HistoryEntry, RateEntry, RatePair, RateStoreSnapshot, SourceStatus};
use crate::rates::{AggregationReport, Quote};
use chrono::{DateTime, Utc};
use comfy_table::Cell;

/// Pairs involving `currency` (all when `None`), optionally only the `top` highest rates.
pub fn select_rates<'a>(
    snapshot: &'a RateStoreSnapshot,
    currency: Option<&CurrencyCode>,
    top: Option<usize>,
) -> Vec<(&'a RatePair, &'a RateEntry)> {
    let mut rows: Vec<_> = snapshot
        .pairs
        .iter()
        .filter(|(pair, _)| currency.is_none_or(|c| pair.involves(c)))
        .collect();
    if let Some(top) = top {
        rows.sort_by(|a, b| b.1.rate.total_cmp(&a.1.rate));
        rows.truncate(top);
    }
    rows
}

fn source_status_text(status: &SourceStatus) -> String {
    match status {
        SourceStatus::Success { rates_count } => format!("success ({rates_count} rates)"),
        SourceStatus::Error { error } => format!("error: {error}"),
    }
}

pub fn render_rates(
    snapshot: &RateStoreSnapshot,
    currency: Option<&CurrencyCode>,
    top: Option<usize>,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> String {
    if snapshot.is_empty() {
        return ui::style_text(
            "No rates cached yet. Run `vtrade update-rates` first.",
            ui::StyleType::Warning,
        );
    }

    let rows = select_rates(snapshot, currency, top);
    if rows.is_empty() {
        let code = currency.map(|c| c.to_string()).unwrap_or_default();
        return ui::style_text(&format!("No rates cached for {code}."), ui::StyleType::Warning);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Updated"),
        ui::header_cell("Source"),
        ui::header_cell("Status"),
    ]);
    for (pair, entry) in rows {
        table.add_row(vec![
            Cell::new(pair.to_string()),
            ui::number_cell(format_rate(entry.rate)),
            Cell::new(entry.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            Cell::new(&entry.source),
            ui::freshness_cell(now - entry.updated_at < ttl),
        ]);
    }

    let mut output = format!("{}\n\n", ui::style_text("Exchange rates", ui::StyleType::Title));
    output.push_str(&table.to_string());

    let last_refresh = snapshot
        .last_refresh
        .map_or("never".to_string(), |t| t.to_rfc3339());
    output.push_str(&format!(
        "\n\n{} {}",
        ui::style_text("Last refresh:", ui::StyleType::TotalLabel),
        last_refresh
    ));
    for (source, status) in &snapshot.source_info {
        output.push_str(&format!(
            "\n  {source}: {}",
            ui::style_text(&source_status_text(status), ui::StyleType::Subtle)
        ));
    }
    output
}

pub fn render_update_report(report: &AggregationReport) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Source"), ui::header_cell("Result")]);
    for (source, status) in &report.sources {
        table.add_row(vec![
            Cell::new(source),
            ui::status_cell(status.is_success(), &source_status_text(status)),
        ]);
    }

    let summary = if report.total_rates > 0 {
        ui::style_text(
            &format!("Updated {} rates", report.total_rates),
            ui::StyleType::TotalValue,
        )
    } else {
        ui::style_text(
            "No rates obtained; cached rates left unchanged",
            ui::StyleType::Error,
        )
    };
    format!("{table}\n\n{summary} at {}", report.timestamp.to_rfc3339())
}

pub fn render_quote(quote: &Quote) -> String {
    let mut output = format!(
        "{} -> {}: {}\n",
        quote.from,
        quote.to,
        ui::style_text(&format_rate(quote.rate), ui::StyleType::TotalValue)
    );
    output.push_str(&format!(
        "Reverse rate {} -> {}: {}\n",
        quote.to,
        quote.from,
        format_rate(quote.reverse_rate())
    ));
    let origin = if quote.derived {
        format!("{} (derived)", quote.source)
    } else {
        quote.source.clone()
    };
    output.push_str(&format!(
        "Updated {} from {origin}",
        quote.updated_at.to_rfc3339()
    ));
    if !quote.fresh {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                "Warning: this rate is stale; run `vtrade update-rates` to refresh it.",
                ui::StyleType::Warning
            )
        ));
    }
    output
}

pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return ui::style_text("No rate history recorded.", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Timestamp"),
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
    ]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            Cell::new(entry.pair().to_string()),
            ui::number_cell(format_rate(entry.rate)),
            Cell::new(&entry.source),
        ]);
    }
    table.to_string()
}

fn format_rate(rate: f64) -> String {
    if rate >= 1.0 {
        format!("{rate:.4}")
    } else {
        format!("{rate:.8}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RateStoreSnapshot {
        let now = Utc::now();
        let mut snapshot = RateStoreSnapshot::default();
        for (pair, rate) in [("BTC_USD", 45000.0), ("ETH_USD", 2500.0), ("EUR_USD", 1.08)] {
            snapshot.pairs.insert(
                pair.parse().unwrap(),
                RateEntry {
                    rate,
                    updated_at: now,
                    source: "test".into(),
                },
            );
        }
        snapshot
    }

    #[test]
    fn test_select_rates_filter_and_top() {
        let snapshot = snapshot();
        let usd = CurrencyCode::parse("usd").unwrap();
        let eth = CurrencyCode::parse("ETH").unwrap();

        assert_eq!(select_rates(&snapshot, None, None).len(), 3);
        assert_eq!(select_rates(&snapshot, Some(&eth), None).len(), 1);

        let top = select_rates(&snapshot, Some(&usd), Some(2));
        let rates: Vec<f64> = top.iter().map(|(_, e)| e.rate).collect();
        assert_eq!(rates, vec![45000.0, 2500.0]);
    }

    #[test]
    fn test_render_empty_snapshot() {
        let output = render_rates(
            &RateStoreSnapshot::default(),
            None,
            None,
            chrono::Duration::seconds(300),
            Utc::now(),
        );
        assert!(output.contains("update-rates"));
    }
}

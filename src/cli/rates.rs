use super::ui;
use crate::core::config::AppConfig;
use crate::core::conversion::convert;
use crate::core::currency::{USD, kind_of, lookup, normalize_code};
use crate::core::rates::{RateMap, RateRecord};
use crate::core::staleness::{Freshness, StalenessConfig, format_age};
use crate::refresh::{RateRefresher, RefreshOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, CellAlignment};
use std::collections::HashMap;

/// One row of the rates table.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub code: String,
    pub name: Option<&'static str>,
    pub units_per_usd: Option<f64>,
    pub converted: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Builds rows for `selection` in display order, converting `amount` of
/// `base` into every selected currency.
pub fn build_rows(
    selection: &[String],
    records: &[RateRecord],
    amount: f64,
    base: &str,
) -> Vec<RateRow> {
    let by_code: HashMap<&str, &RateRecord> =
        records.iter().map(|r| (r.code.as_str(), r)).collect();
    let rates: RateMap = records
        .iter()
        .map(|r| (r.code.clone(), r.units_per_usd))
        .collect();

    selection
        .iter()
        .map(|code| {
            let record = by_code.get(code.as_str());
            let units_per_usd = if code == USD {
                Some(1.0)
            } else {
                record.map(|r| r.units_per_usd)
            };
            RateRow {
                code: code.clone(),
                name: lookup(code).map(|c| c.name),
                units_per_usd,
                converted: convert(amount, base, code, &rates),
                updated_at: record.map(|r| r.updated_at),
            }
        })
        .collect()
}

/// USD is pinned rather than fetched, so it is always fresh.
fn row_freshness(row: &RateRow, staleness: &StalenessConfig, now: DateTime<Utc>) -> Freshness {
    if row.code == USD {
        return Freshness::Fresh;
    }
    staleness.freshness(kind_of(&row.code), row.updated_at, now)
}

pub fn display_as_table(
    rows: &[RateRow],
    amount: f64,
    base: &str,
    staleness: &StalenessConfig,
    now: DateTime<Utc>,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Kind"),
        ui::header_cell("Per USD"),
        ui::header_cell(&format!("{} {base}", ui::format_number(amount))),
        ui::header_cell("Age"),
        ui::header_cell("Status"),
    ]);

    for row in rows {
        let kind = kind_of(&row.code);
        let age = row.updated_at.map_or_else(
            || "-".to_string(),
            |ts| format_age(ts, now),
        );
        table.add_row(vec![
            Cell::new(&row.code),
            Cell::new(row.name.unwrap_or("")),
            Cell::new(kind.to_string()),
            ui::format_optional_cell(row.units_per_usd, ui::format_number),
            ui::format_optional_cell(row.converted, ui::format_number),
            Cell::new(age).set_alignment(CellAlignment::Right),
            ui::freshness_cell(row_freshness(row, staleness, now)),
        ]);
    }

    table.to_string()
}

/// Prints the cached table for the selection.
pub async fn show(
    refresher: &RateRefresher,
    config: &AppConfig,
    amount: Option<f64>,
    base: Option<&str>,
) -> Result<()> {
    let amount = amount.unwrap_or(1.0);
    let base = base.map_or_else(|| config.base(), normalize_code);
    let selection = refresher.selection();
    let records = refresher.store().read_all().await;

    if records.is_empty() {
        println!(
            "{}",
            ui::style_text(
                "No cached rates yet. Run `xcurrency refresh` first.",
                ui::StyleType::Warning
            )
        );
    }

    let rows = build_rows(selection, &records, amount, &base);
    println!("{}", ui::style_text("Exchange rates", ui::StyleType::Title));
    println!(
        "{}",
        display_as_table(&rows, amount, &base, &config.staleness, Utc::now())
    );

    if let Some(ts) = refresher.last_updated().await {
        println!(
            "{} {}",
            ui::style_text("Last updated:", ui::StyleType::Label),
            ui::style_text(&ts.to_rfc3339(), ui::StyleType::Subtle)
        );
    }
    Ok(())
}

/// Runs one foreground cycle behind a spinner and reports how it went.
pub async fn refresh(
    refresher: &RateRefresher,
    config: &AppConfig,
    include_fiat: bool,
    include_crypto: bool,
) -> Result<()> {
    let spinner = ui::new_spinner("Fetching rates...");
    let outcome = refresher.refresh_now(include_fiat, include_crypto).await;
    spinner.finish_and_clear();

    match &outcome {
        RefreshOutcome::Updated(snapshot) => {
            println!(
                "{} {} rates",
                ui::style_text("Updated", ui::StyleType::Success),
                snapshot.rates.len()
            );
            for warning in &snapshot.warnings {
                println!("{}", ui::style_text(warning, ui::StyleType::Warning));
            }
        }
        RefreshOutcome::Superseded => {
            println!(
                "{}",
                ui::style_text("A newer refresh already applied", ui::StyleType::Subtle)
            );
        }
        RefreshOutcome::NoUpdate { attempts, error } => {
            println!(
                "{}",
                ui::style_text(
                    &format!("Refresh failed after {attempts} attempts: {error}"),
                    ui::StyleType::Error
                )
            );
            println!(
                "{}",
                ui::style_text("Showing cached rates", ui::StyleType::Subtle)
            );
        }
    }

    show(refresher, config, None, None).await
}

// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Writing raw category results into workbook regions.
//!
//! Every write starts by clearing the category's region and keeping a copy
//! of the cleared workbook. Whatever goes wrong afterwards, that copy is
//! what comes back, so a failed run never leaves stale numbers behind and
//! running a category twice gives the same result as running it once.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::{flatten_option_chain, Category, RawCategoryResult, Symbol, Table};
use crate::store::{self, StoreError};
use crate::templates::{
    self, cell_for, market_cell_for, EARNINGS_SLOTS, EARNINGS_VALUES, EPS_GROWTH_FIELDS, MARKET_FIELDS,
    PER_SHARE_FIELDS, SELECTED_GROWTH_CELL, YEAR_COLUMNS,
};
use crate::utils::{parse_growth, parse_number, parse_percent, parse_year, select_growth_rate};
use crate::workbook::{CellRef, CellValue, Region, Workbook};

pub const MAX_COLUMN_WIDTH: f64 = 50.0;
pub const EARNINGS_KEY: &str = "earningsDates";
/// Start of the message returned when a result could not be written
pub const FAILURE_PREFIX: &str = "Failed to process";

/// Apply one category result to a workbook. Never fails: problems are
/// reported in the returned message alongside the cleared workbook.
pub fn process(
    category: Category,
    symbol: &Symbol,
    raw: Option<RawCategoryResult>,
    mut workbook: Workbook,
) -> (Workbook, String) {
    let Some(region) = templates::region_for(category) else {
        return (workbook, format!("{} has no region", category));
    };
    workbook.clear_region(&region);
    let checkpoint = workbook.clone();
    let ticker = &symbol.ticker;

    if category.is_domestic_only() && !symbol.is_domestic() {
        return (
            checkpoint,
            format!("{} cleared for {} ({} symbol)", category, ticker, symbol.domesticity),
        );
    }

    let payload = match raw {
        None => return (checkpoint, format!("No {} data for {}; region cleared", category, ticker)),
        Some(RawCategoryResult::Paywalled) => {
            return (checkpoint, format!("{} for {} is paywalled; region cleared", category, ticker))
        }
        Some(RawCategoryResult::Error(msg)) => return (checkpoint, format!("{}; region cleared", msg)),
        Some(payload) => payload,
    };

    let written = match (category, payload) {
        (c, RawCategoryResult::Tables(tables)) if c.is_tabular() => write_tables(&mut workbook, &region, &tables),
        (Category::RevenueGrowth, RawCategoryResult::Scalar(s)) => write_scalar(&mut workbook, &region, &s, parse_growth),
        (Category::CostOfCapital, RawCategoryResult::Scalar(s)) => write_scalar(&mut workbook, &region, &s, parse_percent),
        (Category::PerShareMetrics, RawCategoryResult::Structured(map)) => write_per_share(&mut workbook, &map),
        (Category::MarketData, RawCategoryResult::Structured(map)) => write_market_data(&mut workbook, &map),
        (Category::EarningsDates, RawCategoryResult::Structured(map)) => write_earnings_dates(&mut workbook, &map),
        (Category::OptionChain, RawCategoryResult::Structured(map)) => write_option_chain(&mut workbook, &region, &map),
        (_, other) => Err(format!("unexpected {} result", other.kind())),
    };

    match written {
        Ok(summary) => {
            debug!("{} {}: {}", ticker, category, summary);
            (workbook, format!("{} for {}: {}", category, ticker, summary))
        }
        Err(e) => {
            warn!("Failed to process {} for {}: {}", category, ticker, e);
            (checkpoint, format!("{} {} for {}: {}; region cleared", FAILURE_PREFIX, category, ticker, e))
        }
    }
}

/// Save to `<dir>/<SYMBOL>_<kind>.xlsx`. The workbook comes back untouched
/// whether or not the save worked.
pub fn persist(workbook: Workbook, dir: &Path) -> (Workbook, Result<PathBuf, String>) {
    let result = match store::save(&workbook, dir) {
        Ok(path) => Ok(path),
        Err(StoreError::Locked(path)) => Err(format!(
            "{} is locked by another program; close it and run again to save {}",
            path.display(),
            workbook.symbol
        )),
        Err(e) => Err(format!("Failed to save {}: {}", workbook.file_name(), e)),
    };
    (workbook, result)
}

fn cell_value(raw: &str) -> Option<CellValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match parse_number(trimmed) {
        Some(n) => CellValue::Number(n),
        None => CellValue::Text(trimmed.to_string()),
    })
}

/// Column layout of one table: `(source column, region column)` pairs.
fn layout(table: &Table, region: &Region) -> Vec<(usize, u16)> {
    let width = region.width();
    let mut years: Vec<(i32, usize)> = table
        .headers
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, h)| parse_year(h).map(|y| (y, i)))
        .collect();

    if years.is_empty() {
        let columns = table
            .headers
            .len()
            .max(table.rows.iter().map(Vec::len).max().unwrap_or(0));
        return (0..columns.min(width))
            .map(|i| (i, region.first_col + i as u16))
            .collect();
    }

    // label column plus at most the newest YEAR_COLUMNS years
    let window = YEAR_COLUMNS.min(width.saturating_sub(1)) as i32;
    let latest = years.iter().map(|(y, _)| *y).max().unwrap_or_default();
    years.retain(|(y, _)| *y > latest - window);
    years.sort_by_key(|(y, _)| *y);
    years.dedup_by_key(|(y, _)| *y);

    let mut columns = vec![(0, region.first_col)];
    let count = years.len() as u16;
    for (i, (_, source)) in years.iter().enumerate() {
        columns.push((*source, region.last_col + 1 - count + i as u16));
    }
    columns
}

fn write_tables(workbook: &mut Workbook, region: &Region, tables: &[Table]) -> Result<String, String> {
    if tables.iter().all(Table::is_empty) {
        return Err("no table rows".to_string());
    }

    let mut row = region.first_row;
    let mut written = 0;
    let mut truncated = false;
    for table in tables.iter().filter(|t| !t.is_empty()) {
        let columns = layout(table, region);
        let lines = std::iter::once((&table.headers, true)).chain(table.rows.iter().map(|r| (r, false)));
        for (cells, is_header) in lines {
            if is_header && cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            if row > region.last_row {
                truncated = true;
                break;
            }
            for (source, col) in &columns {
                let Some(raw) = cells.get(*source) else {
                    continue;
                };
                // header cells stay text so `2023` is not turned into a number
                let value = if is_header {
                    Some(raw.trim()).filter(|t| !t.is_empty()).map(CellValue::from)
                } else {
                    cell_value(raw)
                };
                if let Some(value) = value {
                    workbook.set_styled(CellRef::new(region.sheet, row, *col), value, is_header);
                }
            }
            if !is_header {
                written += 1;
            }
            row += 1;
        }
        if truncated {
            break;
        }
        row += 1;
    }

    workbook.autosize_columns(region, MAX_COLUMN_WIDTH);
    if truncated {
        Ok(format!("wrote {} rows (truncated at region bottom)", written))
    } else {
        Ok(format!("wrote {} rows", written))
    }
}

fn write_scalar(
    workbook: &mut Workbook,
    region: &Region,
    raw: &str,
    parse: fn(&str) -> Option<f64>,
) -> Result<String, String> {
    let value = parse(raw).ok_or_else(|| format!("cannot parse {:?}", raw))?;
    workbook.set(CellRef::new(region.sheet, region.first_row, region.first_col), value);
    Ok(format!("{}", value))
}

fn field_text(map: &Map<String, Value>, label: &str) -> Option<String> {
    let value = map.get(label).or_else(|| {
        map.iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(label))
            .map(|(_, v)| v)
    })?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn write_per_share(workbook: &mut Workbook, map: &Map<String, Value>) -> Result<String, String> {
    let mut written = 0;
    for (label, row) in PER_SHARE_FIELDS {
        if let Some(value) = field_text(map, label).as_deref().and_then(parse_number) {
            workbook.set(cell_for(row), value);
            written += 1;
        }
    }

    let mut rates = Vec::new();
    for (label, row) in EPS_GROWTH_FIELDS {
        if let Some(rate) = field_text(map, label).as_deref().and_then(parse_growth) {
            workbook.set(cell_for(row), rate);
            rates.push(rate);
            written += 1;
        }
    }

    if written == 0 {
        return Err("no known per-share fields".to_string());
    }
    match select_growth_rate(&rates) {
        Some(selected) => {
            workbook.set(SELECTED_GROWTH_CELL, selected);
            Ok(format!("wrote {} fields, selected growth {}", written, selected))
        }
        None => Ok(format!("wrote {} fields, no EPS growth rates", written)),
    }
}

fn write_market_data(workbook: &mut Workbook, map: &Map<String, Value>) -> Result<String, String> {
    let mut written = 0;
    for (field, _, row) in MARKET_FIELDS {
        if let Some(value) = map.get(field).and_then(Value::as_f64) {
            workbook.set(market_cell_for(row), value);
            written += 1;
        }
    }
    if written == 0 {
        return Err("no known market fields".to_string());
    }
    Ok(format!("wrote {} of {} fields", written, MARKET_FIELDS.len()))
}

fn write_earnings_dates(workbook: &mut Workbook, map: &Map<String, Value>) -> Result<String, String> {
    let items = map
        .get(EARNINGS_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing {}", EARNINGS_KEY))?;
    let dates: Vec<NaiveDate> = items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .take(EARNINGS_SLOTS as usize)
        .collect();

    for (i, date) in dates.iter().enumerate() {
        let at = CellRef::new(EARNINGS_VALUES.sheet, EARNINGS_VALUES.first_row + i as u32, EARNINGS_VALUES.first_col);
        workbook.set(at, date.format("%Y-%m-%d").to_string());
    }
    if dates.is_empty() {
        Ok("no upcoming earnings dates".to_string())
    } else {
        Ok(format!("wrote {} dates", dates.len()))
    }
}

fn json_cell(value: &Value) -> Option<CellValue> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(CellValue::Number),
        Value::String(s) => Some(CellValue::Text(s.clone())),
        Value::Bool(b) => Some(CellValue::Text(b.to_string())),
        nested => Some(CellValue::Text(nested.to_string())),
    }
}

fn write_option_chain(workbook: &mut Workbook, region: &Region, chain: &Map<String, Value>) -> Result<String, String> {
    let flat = flatten_option_chain(chain)?;
    let width = region.width();
    let dropped_columns = flat.columns.len().saturating_sub(width);
    if dropped_columns > 0 {
        debug!("Option chain has {} columns, keeping {}", flat.columns.len(), width);
    }

    let header_row = region.first_row;
    for (i, name) in flat.columns.iter().take(width).enumerate() {
        workbook.set_styled(CellRef::new(region.sheet, header_row, region.first_col + i as u16), name.as_str(), true);
    }

    let capacity = region.height().saturating_sub(1);
    for (r, row) in flat.rows.iter().take(capacity).enumerate() {
        let at_row = header_row + 1 + r as u32;
        for (i, value) in row.iter().take(width).enumerate() {
            if let Some(cell) = value.as_ref().and_then(json_cell) {
                workbook.set(CellRef::new(region.sheet, at_row, region.first_col + i as u16), cell);
            }
        }
    }

    workbook.autosize_columns(region, MAX_COLUMN_WIDTH);
    let kept = flat.rows.len().min(capacity);
    let mut message = if kept < flat.rows.len() {
        format!("wrote {} of {} contracts", kept, flat.rows.len())
    } else {
        format!("wrote {} contracts", kept)
    };
    if dropped_columns > 0 {
        message.push_str(&format!("; dropped {} of {} columns", dropped_columns, flat.columns.len()));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Domesticity, Validity};
    use crate::templates::{
        new_workbook, FINANCIALS_REGION, FINANCIALS_SHEET, REVENUE_GROWTH_CELL, SUMMARY_REGION, WACC_CELL,
    };
    use crate::workbook::TemplateKind;
    use approx::assert_relative_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn symbol(ticker: &str, domesticity: Domesticity) -> Symbol {
        Symbol {
            ticker: ticker.to_string(),
            validity: Validity::Valid,
            domesticity,
            message: String::new(),
        }
    }

    fn fundamentals(ticker: &str) -> Workbook {
        new_workbook(ticker, TemplateKind::Fundamentals)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn year_table(first: i32, last: i32) -> Table {
        let mut headers = vec!["Fiscal Year".to_string(), "TTM".to_string()];
        let mut revenue = vec!["Revenue".to_string(), "999".to_string()];
        for y in (first..=last).rev() {
            headers.push(format!("FY {}", y));
            revenue.push(format!("{},000", y - 2000));
        }
        Table::new(headers, vec![revenue])
    }

    fn financials_at(wb: &Workbook, row: u32, col: u16) -> Option<CellValue> {
        wb.value(CellRef::new(FINANCIALS_SHEET, row, col)).cloned()
    }

    #[test]
    fn test_year_window_keeps_latest_ten_right_anchored() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Tables(vec![year_table(2010, 2023)]);
        let (wb, msg) = process(Category::Financials, &aapl, Some(raw), fundamentals("AAPL"));
        assert!(msg.contains("wrote 1 rows"), "{}", msg);

        let last = FINANCIALS_REGION.last_col;
        assert_eq!(financials_at(&wb, 0, last), Some(CellValue::Text("FY 2023".into())));
        assert_eq!(financials_at(&wb, 0, last - 9), Some(CellValue::Text("FY 2014".into())));
        assert_eq!(financials_at(&wb, 0, 0), Some(CellValue::Text("Fiscal Year".into())));
        assert_eq!(financials_at(&wb, 1, last), Some(CellValue::Number(23000.0)));
        assert_eq!(financials_at(&wb, 1, last - 9), Some(CellValue::Number(14000.0)));

        // years outside the window and the TTM column are dropped
        let values: Vec<String> = wb
            .region_cells(&FINANCIALS_REGION)
            .into_iter()
            .map(|(_, c)| c.value.to_string())
            .collect();
        assert!(!values.iter().any(|v| v == "FY 2013" || v == "TTM" || v == "999"));
        assert!(wb.sheet(FINANCIALS_SHEET).unwrap().get(0, last).unwrap().bold);
    }

    #[test]
    fn test_short_year_table_is_right_anchored() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Tables(vec![year_table(2021, 2023)]);
        let (wb, _) = process(Category::Ratios, &aapl, Some(raw), fundamentals("AAPL"));
        let region = templates::region_for(Category::Ratios).unwrap();
        let at = |col| wb.value(CellRef::new(region.sheet, 0, col)).map(|v| v.to_string());
        assert_eq!(at(region.last_col).as_deref(), Some("FY 2023"));
        assert_eq!(at(region.last_col - 2).as_deref(), Some("FY 2021"));
        assert_eq!(at(region.last_col - 3), None);
    }

    #[test]
    fn test_foreign_symbol_gets_cleared_region_only() {
        let asml = symbol("ASML", Domesticity::Foreign);
        let mut wb = fundamentals("ASML");
        wb.set(CellRef::new(FINANCIALS_SHEET, 5, 3), 42.0);

        let raw = RawCategoryResult::Tables(vec![year_table(2020, 2023)]);
        let (wb, msg) = process(Category::Financials, &asml, Some(raw), wb);
        assert!(wb.region_is_empty(&FINANCIALS_REGION));
        assert!(msg.contains("foreign"));
    }

    #[test]
    fn test_processing_twice_is_idempotent() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Tables(vec![
            year_table(2019, 2023),
            Table::new(strings(&["Metric", "Value"]), vec![strings(&["Beta", "1.29"])]),
        ]);
        let (once, _) = process(Category::Financials, &aapl, Some(raw.clone()), fundamentals("AAPL"));
        let (twice, _) = process(Category::Financials, &aapl, Some(raw), once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_tables_are_stacked_with_blank_row() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Tables(vec![
            Table::new(strings(&["Metric", "Value"]), vec![strings(&["Market Cap", "2.9T"])]),
            Table::new(strings(&["Metric", "Value"]), vec![strings(&["Beta", "(1.5)"])]),
        ]);
        let (wb, _) = process(Category::Summary, &aapl, Some(raw), fundamentals("AAPL"));
        let at = |row, col| wb.value(CellRef::new(SUMMARY_REGION.sheet, row, col)).cloned();
        let top = SUMMARY_REGION.first_row;
        assert_eq!(at(top + 1, 1), Some(CellValue::Text("2.9T".into())));
        assert_eq!(at(top + 2, 0), None);
        assert_eq!(at(top + 3, 0), Some(CellValue::Text("Metric".into())));
        assert_eq!(at(top + 4, 1), Some(CellValue::Number(-1.5)));
    }

    #[test]
    fn test_tables_truncate_at_region_bottom() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let rows: Vec<Vec<String>> = (0..100).map(|i| vec![format!("row {}", i), i.to_string()]).collect();
        let raw = RawCategoryResult::Tables(vec![Table::new(strings(&["Metric", "Value"]), rows)]);
        let (wb, msg) = process(Category::Summary, &aapl, Some(raw), fundamentals("AAPL"));
        assert!(msg.contains("truncated"));
        let cells = wb.region_cells(&SUMMARY_REGION);
        assert!(cells.iter().all(|((r, _), _)| *r <= SUMMARY_REGION.last_row));
        assert!(wb.value(CellRef::new(0, SUMMARY_REGION.last_row, 0)).is_some());
    }

    #[test]
    fn test_column_width_is_capped() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let long = "x".repeat(80);
        let raw = RawCategoryResult::Tables(vec![Table::new(
            strings(&["Metric", "Value"]),
            vec![vec![long, "1".to_string()], strings(&["Beta", "1.29"])],
        )]);
        let (wb, _) = process(Category::Summary, &aapl, Some(raw), fundamentals("AAPL"));
        let sheet = wb.sheet(SUMMARY_REGION.sheet).unwrap();
        assert_eq!(sheet.column_width(0), Some(MAX_COLUMN_WIDTH));
        assert_eq!(sheet.column_width(1), Some(7.0));
    }

    #[test]
    fn test_error_and_paywall_leave_region_cleared() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let (filled, _) = process(
            Category::Summary,
            &aapl,
            Some(RawCategoryResult::Tables(vec![year_table(2022, 2023)])),
            fundamentals("AAPL"),
        );
        assert!(!filled.region_is_empty(&SUMMARY_REGION));

        let (wb, msg) = process(Category::Summary, &aapl, Some(RawCategoryResult::Paywalled), filled.clone());
        assert!(wb.region_is_empty(&SUMMARY_REGION));
        assert!(msg.contains("paywalled"));

        let err = RawCategoryResult::Error("Failed to fetch summary for AAPL: timed out".to_string());
        let (wb, msg) = process(Category::Summary, &aapl, Some(err), filled.clone());
        assert!(wb.region_is_empty(&SUMMARY_REGION));
        assert!(msg.starts_with("Failed to fetch summary for AAPL"));

        let (wb, msg) = process(Category::Summary, &aapl, None, filled);
        assert!(wb.region_is_empty(&SUMMARY_REGION));
        assert!(msg.contains("No summary data"));
    }

    #[test]
    fn test_empty_tables_fall_back_to_checkpoint() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let (wb, msg) = process(
            Category::Summary,
            &aapl,
            Some(RawCategoryResult::Tables(vec![Table::default()])),
            fundamentals("AAPL"),
        );
        assert!(wb.region_is_empty(&SUMMARY_REGION));
        assert!(msg.contains("Failed to process summary"));
    }

    #[test]
    fn test_wacc_percentage() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Scalar("27.89%".to_string());
        let (wb, _) = process(Category::CostOfCapital, &aapl, Some(raw), fundamentals("AAPL"));
        assert_relative_eq!(wb.number(WACC_CELL).unwrap(), 0.2789, epsilon = 1e-12);
    }

    #[test]
    fn test_wacc_without_percent_is_rejected() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Scalar("n/a".to_string());
        let (wb, msg) = process(Category::CostOfCapital, &aapl, Some(raw), fundamentals("AAPL"));
        assert_eq!(wb.value(WACC_CELL), None);
        assert!(msg.contains("cannot parse"));
    }

    #[test]
    fn test_revenue_growth_dash_is_zero() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let raw = RawCategoryResult::Scalar("-".to_string());
        let (wb, _) = process(Category::RevenueGrowth, &aapl, Some(raw), fundamentals("AAPL"));
        assert_eq!(wb.number(REVENUE_GROWTH_CELL), Some(0.0));
    }

    #[test]
    fn test_per_share_selects_max_growth_when_not_all_positive() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let map = json!({
            "EPS (Diluted)": "6.13",
            "book value per share": "4.38",
            "3-Year EPS Growth Rate": "3%",
            "5-Year EPS Growth Rate": "5%",
            "10-Year EPS Growth Rate": "-2%",
        });
        let raw = RawCategoryResult::Structured(map.as_object().unwrap().clone());
        let (wb, msg) = process(Category::PerShareMetrics, &aapl, Some(raw), fundamentals("AAPL"));
        assert_relative_eq!(wb.number(SELECTED_GROWTH_CELL).unwrap(), 0.05, epsilon = 1e-12);
        assert_relative_eq!(wb.number(cell_for(2)).unwrap(), 6.13);
        assert_relative_eq!(wb.number(cell_for(3)).unwrap(), 4.38);
        assert_relative_eq!(wb.number(cell_for(9)).unwrap(), -0.02, epsilon = 1e-12);
        assert!(msg.contains("wrote 5 fields"));
    }

    #[test]
    fn test_per_share_selects_min_growth_when_all_positive() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let map = json!({
            "3-Year EPS Growth Rate": "12%",
            "5-Year EPS Growth Rate": "8%",
            "10-Year EPS Growth Rate": "15%",
        });
        let raw = RawCategoryResult::Structured(map.as_object().unwrap().clone());
        let (wb, _) = process(Category::PerShareMetrics, &aapl, Some(raw), fundamentals("AAPL"));
        assert_relative_eq!(wb.number(SELECTED_GROWTH_CELL).unwrap(), 0.08, epsilon = 1e-12);
    }

    #[test]
    fn test_market_data_fields() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let map = json!({"regularMarketPrice": 189.5, "beta": 1.29, "unrelated": 1.0});
        let raw = RawCategoryResult::Structured(map.as_object().unwrap().clone());
        let (wb, msg) = process(Category::MarketData, &aapl, Some(raw), fundamentals("AAPL"));
        assert_eq!(wb.number(market_cell_for(2)), Some(189.5));
        assert_eq!(wb.number(market_cell_for(4)), Some(1.29));
        assert_eq!(wb.value(market_cell_for(3)), None);
        assert!(msg.contains("wrote 2 of 9"));
    }

    #[test]
    fn test_earnings_dates_written_as_text() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let map = json!({"earningsDates": ["2024-10-31", "not a date", "2025-01-30", "2025-05-01", "2025-07-31", "2025-10-30"]});
        let raw = RawCategoryResult::Structured(map.as_object().unwrap().clone());
        let (wb, _) = process(Category::EarningsDates, &aapl, Some(raw), fundamentals("AAPL"));
        let first = CellRef::new(EARNINGS_VALUES.sheet, EARNINGS_VALUES.first_row, EARNINGS_VALUES.first_col);
        assert_eq!(wb.value(first), Some(&CellValue::Text("2024-10-31".into())));
        assert_eq!(wb.region_cells(&EARNINGS_VALUES).len(), 4);
    }

    #[test]
    fn test_option_chain_rows() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let chain = json!({
            "symbol": "AAPL",
            "status": "SUCCESS",
            "underlyingPrice": 189.5,
            "callExpDateMap": {
                "2024-06-21:5": {
                    "185.0": [{"putCall": "CALL", "bid": 6.1, "optionDeliverablesList": [{"symbol": "AAPL"}]}],
                    "190.0": [{"putCall": "CALL", "bid": 3.2}]
                }
            },
            "putExpDateMap": {
                "2024-06-21:5": {"185.0": [{"putCall": "PUT", "bid": 1.4}]}
            }
        });
        let raw = RawCategoryResult::Structured(chain.as_object().unwrap().clone());
        let wb = new_workbook("AAPL", TemplateKind::Options);
        let (wb, msg) = process(Category::OptionChain, &aapl, Some(raw), wb);
        assert!(msg.contains("wrote 3 contracts"), "{}", msg);

        let region = templates::region_for(Category::OptionChain).unwrap();
        let header: Vec<String> = wb
            .region_cells(&region)
            .into_iter()
            .filter(|((r, _), _)| *r == region.first_row)
            .map(|(_, c)| {
                assert!(c.bold);
                c.value.to_string()
            })
            .collect();
        assert!(header.contains(&"expirationKey".to_string()));
        assert!(header.contains(&"chain.underlyingPrice".to_string()));

        let nested = wb
            .region_cells(&region)
            .into_iter()
            .any(|(_, c)| c.value.to_string() == r#"[{"symbol":"AAPL"}]"#);
        assert!(nested);
    }

    #[test]
    fn test_option_chain_reports_dropped_columns() {
        let aapl = symbol("AAPL", Domesticity::Domestic);
        let mut contract = serde_json::Map::new();
        for i in 0..70 {
            contract.insert(format!("field{:02}", i), json!(i));
        }
        let chain = json!({
            "symbol": "AAPL",
            "status": "SUCCESS",
            "callExpDateMap": {"2024-06-21:5": {"185.0": [contract]}},
            "putExpDateMap": {}
        });
        let raw = RawCategoryResult::Structured(chain.as_object().unwrap().clone());
        let wb = new_workbook("AAPL", TemplateKind::Options);
        let (wb, msg) = process(Category::OptionChain, &aapl, Some(raw), wb);
        assert!(msg.contains("wrote 1 contracts"), "{}", msg);
        assert!(msg.contains("dropped"), "{}", msg);
        assert!(msg.contains("columns"), "{}", msg);

        let region = templates::region_for(Category::OptionChain).unwrap();
        let header_cells = wb
            .region_cells(&region)
            .into_iter()
            .filter(|((r, _), _)| *r == region.first_row)
            .count();
        assert_eq!(header_cells, region.width());
    }

    #[test]
    fn test_persist_locked_returns_input_unchanged() {
        let dir = tempdir().unwrap();
        let wb = fundamentals("AAPL");
        std::fs::write(dir.path().join(format!("~${}", wb.file_name())), b"").unwrap();

        let (back, result) = persist(wb.clone(), dir.path());
        assert_eq!(back, wb);
        let msg = result.unwrap_err();
        assert!(msg.contains("locked"));
        assert!(!dir.path().join(wb.file_name()).exists());
    }

    #[test]
    fn test_persist_writes_file() {
        let dir = tempdir().unwrap();
        let (_, result) = persist(fundamentals("MSFT"), dir.path());
        let path = result.unwrap();
        assert_eq!(path, dir.path().join("MSFT_fundamentals.xlsx"));
        assert!(path.exists());
    }
}

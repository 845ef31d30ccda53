// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Cell layout of the two workbook templates.
//!
//! Every category owns a disjoint region; `all_regions` is checked for
//! overlaps in the tests below.

use crate::models::Category;
use crate::workbook::{CellRef, Region, TemplateKind, Workbook};

pub const SUMMARY_SHEET: usize = 0;
pub const FINANCIALS_SHEET: usize = 1;
pub const RATIOS_SHEET: usize = 2;
pub const CHAIN_SHEET: usize = 0;

const FUNDAMENTALS_SHEETS: [&str; 3] = ["Summary", "Financials", "Ratios"];
const OPTIONS_SHEETS: [&str; 1] = ["Option Chain"];

pub const SYMBOL_LABEL: CellRef = CellRef::new(0, 0, 0);
pub const SYMBOL_CELL: CellRef = CellRef::new(0, 0, 1);

/// Label column + 10 fiscal years
pub const YEAR_COLUMNS: usize = 10;

pub const SUMMARY_REGION: Region = Region::new(SUMMARY_SHEET, 2, 0, 41, 3);
pub const FINANCIALS_REGION: Region = Region::new(FINANCIALS_SHEET, 0, 0, 199, YEAR_COLUMNS as u16);
pub const RATIOS_REGION: Region = Region::new(RATIOS_SHEET, 0, 0, 79, YEAR_COLUMNS as u16);
pub const CHAIN_REGION: Region = Region::new(CHAIN_SHEET, 2, 0, 5001, 59);

const LABEL_COL: u16 = 5;
const VALUE_COL: u16 = 6;
const MARKET_LABEL_COL: u16 = 8;
const MARKET_VALUE_COL: u16 = 9;

/// Per-share labels as the metrics page prints them, with the row they land on.
pub const PER_SHARE_FIELDS: [(&str, u32); 5] = [
    ("EPS (Diluted)", 2),
    ("Book Value per Share", 3),
    ("Free Cash Flow per Share", 4),
    ("Revenue per Share", 5),
    ("Dividend per Share", 6),
];

/// 3, 5 and 10 year EPS growth, in that order
pub const EPS_GROWTH_FIELDS: [(&str, u32); 3] = [
    ("3-Year EPS Growth Rate", 7),
    ("5-Year EPS Growth Rate", 8),
    ("10-Year EPS Growth Rate", 9),
];

pub const SELECTED_GROWTH_LABEL: &str = "Selected EPS Growth";
pub const SELECTED_GROWTH_CELL: CellRef = CellRef::new(SUMMARY_SHEET, 10, VALUE_COL);
pub const PER_SHARE_VALUES: Region = Region::new(SUMMARY_SHEET, 2, VALUE_COL, 10, VALUE_COL);

pub const REVENUE_GROWTH_CELL: CellRef = CellRef::new(SUMMARY_SHEET, 13, VALUE_COL);
pub const WACC_CELL: CellRef = CellRef::new(SUMMARY_SHEET, 14, VALUE_COL);

/// Quote-summary field name, label, row
pub const MARKET_FIELDS: [(&str, &str, u32); 9] = [
    ("regularMarketPrice", "Price", 2),
    ("marketCap", "Market Cap", 3),
    ("beta", "Beta", 4),
    ("sharesOutstanding", "Shares Outstanding", 5),
    ("trailingPE", "Trailing P/E", 6),
    ("forwardPE", "Forward P/E", 7),
    ("dividendYield", "Dividend Yield", 8),
    ("fiftyTwoWeekHigh", "52 Week High", 9),
    ("fiftyTwoWeekLow", "52 Week Low", 10),
];
pub const MARKET_VALUES: Region = Region::new(SUMMARY_SHEET, 2, MARKET_VALUE_COL, 10, MARKET_VALUE_COL);

pub const EARNINGS_SLOTS: u32 = 4;
pub const EARNINGS_VALUES: Region =
    Region::new(SUMMARY_SHEET, 13, MARKET_VALUE_COL, 13 + EARNINGS_SLOTS - 1, MARKET_VALUE_COL);

pub fn cell_for(row: u32) -> CellRef {
    CellRef::new(SUMMARY_SHEET, row, VALUE_COL)
}

pub fn market_cell_for(row: u32) -> CellRef {
    CellRef::new(SUMMARY_SHEET, row, MARKET_VALUE_COL)
}

/// The region a category writes into, if it has a rectangular one
pub fn region_for(category: Category) -> Option<Region> {
    match category {
        Category::Summary => Some(SUMMARY_REGION),
        Category::Financials => Some(FINANCIALS_REGION),
        Category::Ratios => Some(RATIOS_REGION),
        Category::PerShareMetrics => Some(PER_SHARE_VALUES),
        Category::RevenueGrowth => Some(single(REVENUE_GROWTH_CELL)),
        Category::CostOfCapital => Some(single(WACC_CELL)),
        Category::MarketData => Some(MARKET_VALUES),
        Category::EarningsDates => Some(EARNINGS_VALUES),
        Category::OptionChain => Some(CHAIN_REGION),
    }
}

pub fn template_for(category: Category) -> TemplateKind {
    match category {
        Category::OptionChain => TemplateKind::Options,
        _ => TemplateKind::Fundamentals,
    }
}

fn single(at: CellRef) -> Region {
    Region::new(at.sheet, at.row, at.col, at.row, at.col)
}

/// Build the empty skeleton of a template with its static labels filled in
pub fn new_workbook(symbol: &str, kind: TemplateKind) -> Workbook {
    match kind {
        TemplateKind::Fundamentals => {
            let mut wb = Workbook::new(symbol, kind, &FUNDAMENTALS_SHEETS);
            wb.set_styled(SYMBOL_LABEL, "Symbol", true);
            wb.set_styled(SYMBOL_CELL, symbol, true);
            for (label, row) in PER_SHARE_FIELDS.iter().chain(EPS_GROWTH_FIELDS.iter()) {
                wb.set(CellRef::new(SUMMARY_SHEET, *row, LABEL_COL), *label);
            }
            wb.set(CellRef::new(SUMMARY_SHEET, SELECTED_GROWTH_CELL.row, LABEL_COL), SELECTED_GROWTH_LABEL);
            wb.set(CellRef::new(SUMMARY_SHEET, REVENUE_GROWTH_CELL.row, LABEL_COL), "Revenue Growth");
            wb.set(CellRef::new(SUMMARY_SHEET, WACC_CELL.row, LABEL_COL), "WACC");
            for (_, label, row) in MARKET_FIELDS {
                wb.set(CellRef::new(SUMMARY_SHEET, row, MARKET_LABEL_COL), label);
            }
            wb.set(
                CellRef::new(SUMMARY_SHEET, EARNINGS_VALUES.first_row, MARKET_LABEL_COL),
                "Earnings Dates",
            );
            wb
        }
        TemplateKind::Options => {
            let mut wb = Workbook::new(symbol, kind, &OPTIONS_SHEETS);
            wb.set_styled(SYMBOL_LABEL, "Symbol", true);
            wb.set_styled(SYMBOL_CELL, symbol, true);
            wb
        }
    }
}

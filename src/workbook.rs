// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory spreadsheet document.
//!
//! A `Workbook` is a plain value: the processor takes one in and hands an
//! updated one back, so no two tasks ever share a mutable document.

use std::collections::BTreeMap;
use std::fmt;

/// Which template a workbook was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    Fundamentals,
    Options,
}

impl TemplateKind {
    pub fn file_suffix(&self) -> &'static str {
        match self {
            TemplateKind::Fundamentals => "fundamentals",
            TemplateKind::Options => "options",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub bold: bool,
}

/// Absolute cell address; rows and columns are zero-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub const fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }
}

/// Inclusive rectangular range on one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub sheet: usize,
    pub first_row: u32,
    pub first_col: u16,
    pub last_row: u32,
    pub last_col: u16,
}

impl Region {
    pub const fn new(sheet: usize, first_row: u32, first_col: u16, last_row: u32, last_col: u16) -> Self {
        Self {
            sheet,
            first_row,
            first_col,
            last_row,
            last_col,
        }
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        (self.first_row..=self.last_row).contains(&row) && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn width(&self) -> usize {
        usize::from(self.last_col - self.first_col) + 1
    }

    pub fn height(&self) -> usize {
        (self.last_row - self.first_row) as usize + 1
    }

    #[cfg(test)]
    pub fn overlaps(&self, other: &Region) -> bool {
        self.sheet == other.sheet
            && self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_col <= other.last_col
            && other.first_col <= self.last_col
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(u32, u16), Cell>,
    column_widths: BTreeMap<u16, f64>,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn set(&mut self, row: u32, col: u16, value: impl Into<CellValue>, bold: bool) {
        self.cells.insert(
            (row, col),
            Cell {
                value: value.into(),
                bold,
            },
        );
    }

    pub fn cells(&self) -> impl Iterator<Item = ((u32, u16), &Cell)> {
        self.cells.iter().map(|(k, v)| (*k, v))
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.column_widths.iter().map(|(k, v)| (*k, *v))
    }

    #[cfg(test)]
    pub fn column_width(&self, col: u16) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        self.column_widths.insert(col, width);
    }

    fn reset_column_width(&mut self, col: u16) {
        self.column_widths.remove(&col);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub symbol: String,
    pub kind: TemplateKind,
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(symbol: &str, kind: TemplateKind, sheet_names: &[&str]) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
            sheets: sheet_names.iter().map(|n| Sheet::new(n)).collect(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.xlsx", sanitize_file_stem(&self.symbol), self.kind.file_suffix())
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    pub fn value(&self, at: CellRef) -> Option<&CellValue> {
        self.sheet(at.sheet)?.get(at.row, at.col).map(|c| &c.value)
    }

    pub fn number(&self, at: CellRef) -> Option<f64> {
        match self.value(at)? {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }

    /// Returns false when the sheet does not exist.
    pub fn set(&mut self, at: CellRef, value: impl Into<CellValue>) -> bool {
        self.set_styled(at, value, false)
    }

    pub fn set_styled(&mut self, at: CellRef, value: impl Into<CellValue>, bold: bool) -> bool {
        match self.sheet_mut(at.sheet) {
            Some(sheet) => {
                sheet.set(at.row, at.col, value, bold);
                true
            }
            None => false,
        }
    }

    /// Remove every value inside `region`. Column widths are left alone.
    pub fn clear_region(&mut self, region: &Region) {
        if let Some(sheet) = self.sheet_mut(region.sheet) {
            sheet.cells.retain(|(row, col), _| !region.contains(*row, *col));
        }
    }

    pub fn region_is_empty(&self, region: &Region) -> bool {
        self.sheet(region.sheet)
            .map(|s| s.cells.keys().all(|(r, c)| !region.contains(*r, *c)))
            .unwrap_or(true)
    }

    /// Cells of `region` in row-major order, for comparing written areas
    #[cfg(test)]
    pub fn region_cells(&self, region: &Region) -> Vec<((u32, u16), Cell)> {
        self.sheet(region.sheet)
            .map(|s| {
                s.cells
                    .iter()
                    .filter(|((r, c), _)| region.contains(*r, *c))
                    .map(|(k, v)| (*k, v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Size every column of `region` to its longest stringified value inside
    /// the region. Columns left empty fall back to the default width.
    pub fn autosize_columns(&mut self, region: &Region, cap: f64) {
        let Some(sheet) = self.sheet_mut(region.sheet) else {
            return;
        };
        for col in region.first_col..=region.last_col {
            let longest = sheet
                .cells
                .iter()
                .filter(|((r, c), _)| *c == col && region.contains(*r, *c))
                .map(|(_, cell)| cell.value.to_string().chars().count())
                .max();
            match longest {
                Some(len) => sheet.set_column_width(col, (len as f64 + 2.0).min(cap)),
                None => sheet.reset_column_width(col),
            }
        }
    }
}

fn sanitize_file_stem(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

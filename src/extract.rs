// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Turning fetched documents into raw category results.

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::FetchError;
use crate::models::Table;

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("invalid selector {}: {}", css, e)))
}

fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every `table` matching `table_selector`, header from `thead` (or the first
/// row when there is none), rows from the remaining `tr`s.
pub fn parse_tables(html: &str, table_selector: &str) -> Result<Vec<Table>, FetchError> {
    let document = Html::parse_document(html);
    let table_sel = selector(table_selector)?;
    let head_sel = selector("thead tr")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let mut tables = Vec::new();
    for table in document.select(&table_sel) {
        let mut headers: Vec<String> = table
            .select(&head_sel)
            .next()
            .map(|tr| tr.select(&cell_sel).map(cell_text).collect())
            .unwrap_or_default();
        let had_head = !headers.is_empty();

        let mut rows: Vec<Vec<String>> = table
            .select(&row_sel)
            .filter(|tr| {
                !tr.ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| a.value().name() == "thead")
            })
            .map(|tr| tr.select(&cell_sel).map(cell_text).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .collect();

        if !had_head && !rows.is_empty() && looks_like_header(&rows[0]) {
            headers = rows.remove(0);
        }
        if rows.is_empty() {
            continue;
        }
        tables.push(Table::new(headers, rows));
    }

    debug!("Parsed {} tables matching {}", tables.len(), table_selector);
    if tables.is_empty() {
        return Err(FetchError::NotFound(format!("table matching {}", table_selector)));
    }
    Ok(tables)
}

fn looks_like_header(cells: &[String]) -> bool {
    cells.iter().skip(1).any(|c| crate::utils::parse_year(c).is_some())
}

/// Label/value pairs from two-column rows of the matching tables
pub fn parse_label_values(html: &str, table_selector: &str) -> Result<Map<String, Value>, FetchError> {
    let tables = parse_tables(html, table_selector)?;
    let mut map = Map::new();
    for table in tables {
        for row in table.rows {
            if let [label, value, ..] = row.as_slice() {
                let label = label.trim_end_matches(':').trim();
                if !label.is_empty() && !map.contains_key(label) {
                    map.insert(label.to_string(), Value::String(value.clone()));
                }
            }
        }
    }
    if map.is_empty() {
        return Err(FetchError::NotFound(format!("label/value rows in {}", table_selector)));
    }
    Ok(map)
}

/// First element matching `css` whose text holds a percentage, e.g. `8.12%`
pub fn find_percentage(html: &str, css: &str) -> Result<String, FetchError> {
    let document = Html::parse_document(html);
    let sel = selector(css)?;
    for element in document.select(&sel) {
        let text = cell_text(element);
        if let Some(pct) = text
            .split_whitespace()
            .find(|w| w.ends_with('%') && crate::utils::parse_percent(w).is_some())
        {
            return Ok(pct.to_string());
        }
    }
    Err(FetchError::NotFound("WACC value".to_string()))
}

/// Most recent value of the `Revenue` row of a growth document.
///
/// Rows are either arrays led by their label (`["Revenue", "8.2%", ...]`)
/// or objects carrying a `label`, `name` or `id` field next to a `values`
/// list or a `value`. The row is searched for anywhere in the document.
pub fn find_revenue_growth(doc: &Value) -> Result<String, FetchError> {
    find_labeled_row(doc, "Revenue")
        .and_then(|values| values.into_iter().find(|v| !v.trim().is_empty()))
        .ok_or_else(|| FetchError::NotFound("Revenue growth row".to_string()))
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn find_labeled_row(doc: &Value, label: &str) -> Option<Vec<String>> {
    match doc {
        Value::Array(items) => {
            if let Some(Value::String(first)) = items.first() {
                if first.eq_ignore_ascii_case(label) {
                    return Some(items.iter().skip(1).filter_map(value_text).collect());
                }
            }
            items.iter().find_map(|item| find_labeled_row(item, label))
        }
        Value::Object(obj) => {
            let is_row = ["label", "name", "id"]
                .iter()
                .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                .any(|l| l.eq_ignore_ascii_case(label));
            if is_row {
                if let Some(Value::Array(values)) = obj.get("values").or_else(|| obj.get("data")) {
                    return Some(values.iter().filter_map(value_text).collect());
                }
                if let Some(v) = obj.get("value").and_then(value_text) {
                    return Some(vec![v]);
                }
            }
            obj.values().find_map(|v| find_labeled_row(v, label))
        }
        _ => None,
    }
}

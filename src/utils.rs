// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use regex::Regex;
use std::sync::OnceLock;

/// Column headers that name a fiscal year, e.g. `2023` or `FY 2023`
fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:FY\s?)?(\d{4})$").expect("valid year pattern"))
}

pub fn parse_year(header: &str) -> Option<i32> {
    year_pattern()
        .captures(header.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a source cell into a number.
///
/// Handles thousands separators, a trailing `%` (divided by 100) and
/// accounting-style negatives such as `(1,234)`. Anything else is `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut s = raw.trim().replace(',', "");
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = s[1..s.len() - 1].trim().to_string();
    }

    let percent = s.ends_with('%');
    if percent {
        s.pop();
        s = s.trim().to_string();
    }

    let mut value: f64 = s.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if percent {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }
    Some(value)
}

/// Parse a percentage string such as `27.89%` into `0.2789`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if !trimmed.ends_with('%') {
        return None;
    }
    parse_number(trimmed)
}

/// Growth inputs: a bare `-` means the source reports no growth.
pub fn parse_growth(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "-" || trimmed == "—" {
        return Some(0.0);
    }
    parse_number(trimmed)
}

/// Conservative growth: the smallest rate when every rate is positive,
/// otherwise the largest.
pub fn select_growth_rate(rates: &[f64]) -> Option<f64> {
    if rates.is_empty() {
        return None;
    }
    let all_positive = rates.iter().all(|r| *r > 0.0);
    let pick = if all_positive {
        rates.iter().copied().fold(f64::INFINITY, f64::min)
    } else {
        rates.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    };
    Some(pick)
}

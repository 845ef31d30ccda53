// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    Valid,
    Invalid,
}

/// Where the issuer is domiciled. `Unknown` only exists before classification;
/// a failed lookup classifies as `Foreign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domesticity {
    Domestic,
    Foreign,
    Unknown,
}

impl fmt::Display for Domesticity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Domesticity::Domestic => "domestic",
            Domesticity::Foreign => "foreign",
            Domesticity::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub validity: Validity,
    pub domesticity: Domesticity,
    /// Human readable outcome of the validation lookup
    pub message: String,
}

impl Symbol {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            validity: Validity::Invalid,
            domesticity: Domesticity::Unknown,
            message: String::from("not validated"),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    pub fn is_domestic(&self) -> bool {
        self.domesticity == Domesticity::Domestic
    }
}

pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Split user input on commas/whitespace, normalize, drop blanks and repeats.
/// First occurrence wins so the caller's order is kept.
pub fn parse_ticker_list<S: AsRef<str>>(inputs: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tickers = Vec::new();
    for input in inputs {
        for part in input.as_ref().split(|c: char| c == ',' || c.is_whitespace()) {
            let ticker = normalize_ticker(part);
            if ticker.is_empty() {
                continue;
            }
            if seen.insert(ticker.clone()) {
                tickers.push(ticker);
            }
        }
    }
    tickers
}

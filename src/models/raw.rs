// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scraped table. The first column of every row is the row label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Unprocessed outcome of fetching one (symbol, category) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCategoryResult {
    Tables(Vec<Table>),
    Scalar(String),
    Structured(Map<String, Value>),
    Error(String),
    /// The page only shows the data to paying users; for free accounts this
    /// means the issuer is not domestic.
    Paywalled,
}

impl RawCategoryResult {
    pub fn is_paywalled(&self) -> bool {
        matches!(self, RawCategoryResult::Paywalled)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawCategoryResult::Tables(_) => "tables",
            RawCategoryResult::Scalar(_) => "scalar",
            RawCategoryResult::Structured(_) => "structured",
            RawCategoryResult::Error(_) => "error",
            RawCategoryResult::Paywalled => "paywalled",
        }
    }
}

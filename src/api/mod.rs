// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

pub mod broker;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

pub use broker::{BrokerClient, OptionChainSource};
pub use yahoo::YahooClient;

/// Market-data lookups used for validation, market fields and earnings dates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Daily price rows over the last month
    async fn history_rows(&self, symbol: &str) -> Result<usize>;
    /// Issuer country, when the source knows it
    async fn country(&self, symbol: &str) -> Result<Option<String>>;
    /// Numeric quote fields keyed by their upstream name, e.g. `marketCap`
    async fn quote_fields(&self, symbol: &str) -> Result<Map<String, Value>>;
    /// Upcoming earnings dates, earliest first
    async fn earnings_dates(&self, symbol: &str) -> Result<Vec<NaiveDate>>;
}

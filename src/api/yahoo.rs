// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::header::REFERER;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use super::MarketData;

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const QUOTE_MODULES: &str = "price,summaryDetail,defaultKeyStatistics";

pub struct YahooClient {
    connector: yahoo::YahooConnector,
    http: Client,
    crumb: Mutex<Option<String>>,
}

impl YahooClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let connector = yahoo::YahooConnector::new().context("Failed to create Yahoo connector")?;
        let http = Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            connector,
            http,
            crumb: Mutex::new(None),
        })
    }

    /// Session cookie from fc.yahoo.com, then a crumb; cached until rejected.
    async fn crumb(&self) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // fc.yahoo.com answers 404 but sets the session cookie
        self.http
            .get(COOKIE_URL)
            .header(REFERER, "https://finance.yahoo.com/")
            .send()
            .await
            .context("Failed to fetch Yahoo session cookie")?;

        for url in CRUMB_URLS {
            let response = match self
                .http
                .get(url)
                .header(REFERER, "https://finance.yahoo.com/")
                .send()
                .await
            {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    debug!("Crumb endpoint {} returned {}", url, r.status());
                    continue;
                }
                Err(e) => {
                    debug!("Crumb endpoint {} failed: {}", url, e);
                    continue;
                }
            };
            let body = response.text().await.unwrap_or_default();
            let body = body.trim();
            if !body.is_empty() && body.len() < 100 && !body.contains(' ') && !body.contains('<') {
                *cached = Some(body.to_string());
                return Ok(body.to_string());
            }
        }
        anyhow::bail!("Failed to obtain Yahoo crumb")
    }

    /// First `quoteSummary` result for `symbol` with the given modules
    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value> {
        let crumb = self.crumb().await?;
        let url = format!("{}/{}", SUMMARY_URL, symbol);
        let response = self
            .http
            .get(&url)
            .query(&[("modules", modules), ("crumb", crumb.as_str())])
            .send()
            .await
            .context("Failed to send quoteSummary request")?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("Yahoo rejected the crumb, refreshing on next call");
            *self.crumb.lock().await = None;
            anyhow::bail!("quoteSummary for {} returned {}", symbol, status);
        }
        if !status.is_success() {
            anyhow::bail!("quoteSummary for {} returned {}", symbol, status);
        }

        let doc: Value = response
            .json()
            .await
            .context("Failed to parse quoteSummary response")?;
        doc.pointer("/quoteSummary/result/0")
            .cloned()
            .with_context(|| format!("No quoteSummary result for {}", symbol))
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn history_rows(&self, symbol: &str) -> Result<usize> {
        let response = self
            .connector
            .get_quote_range(symbol, "1d", "1mo")
            .await
            .map_err(|e| anyhow::anyhow!("price history for {}: {}", symbol, e))?;
        let quotes = response
            .quotes()
            .map_err(|e| anyhow::anyhow!("price history for {}: {}", symbol, e))?;
        Ok(quotes.len())
    }

    async fn country(&self, symbol: &str) -> Result<Option<String>> {
        let result = self.quote_summary(symbol, "assetProfile").await?;
        Ok(country_of(&result))
    }

    async fn quote_fields(&self, symbol: &str) -> Result<Map<String, Value>> {
        let result = self.quote_summary(symbol, QUOTE_MODULES).await?;
        Ok(flatten_quote_fields(&result))
    }

    async fn earnings_dates(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let result = self.quote_summary(symbol, "calendarEvents").await?;
        Ok(earnings_dates_of(&result))
    }
}

fn country_of(result: &Value) -> Option<String> {
    result
        .pointer("/assetProfile/country")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `{"raw": 1.2, "fmt": "1.20"}` and bare numbers both yield the number
fn raw_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::Object(obj) => obj.get("raw").filter(|v| v.is_number()).cloned(),
        _ => None,
    }
}

/// Numeric fields of the quote modules; the first module carrying a field wins.
fn flatten_quote_fields(result: &Value) -> Map<String, Value> {
    let mut fields = Map::new();
    for module in QUOTE_MODULES.split(',') {
        let Some(obj) = result.get(module).and_then(Value::as_object) else {
            continue;
        };
        for (key, value) in obj {
            if fields.contains_key(key) {
                continue;
            }
            if let Some(number) = raw_number(value) {
                fields.insert(key.clone(), number);
            }
        }
    }
    fields
}

fn earnings_dates_of(result: &Value) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = result
        .pointer("/calendarEvents/earnings/earningsDate")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| raw_number(item).and_then(|v| v.as_i64()))
                .filter_map(|ts| DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.date_naive())
                .collect()
        })
        .unwrap_or_default();
    dates.sort();
    dates.dedup();
    dates
}

// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Resolvability and domestic/foreign classification of requested symbols.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::api::MarketData;
use crate::models::{parse_ticker_list, Domesticity, Symbol, Validity};
use crate::rate_limiter::RateLimiter;

pub const VALIDATE_KEY: &str = "validate";
pub const NATIONALITY_KEY: &str = "nationality";
const DOMESTIC_COUNTRY: &str = "United States";

pub struct Validator {
    source: Arc<dyn MarketData>,
    limiter: Arc<RateLimiter>,
    workers: Arc<Semaphore>,
}

impl Validator {
    pub fn new(source: Arc<dyn MarketData>, limiter: Arc<RateLimiter>, workers: usize) -> Self {
        Self {
            source,
            limiter,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn validate(&self, ticker: &str) -> (Validity, String) {
        self.limiter.acquire(VALIDATE_KEY).await;
        match self.source.history_rows(ticker).await {
            Ok(0) => (
                Validity::Invalid,
                format!("No price history found for {}", ticker),
            ),
            Ok(rows) => (
                Validity::Valid,
                format!("{} price rows in the last month", rows),
            ),
            Err(e) => (
                Validity::Invalid,
                format!("Price history lookup failed for {}: {}", ticker, e),
            ),
        }
    }

    /// Anything other than a confirmed domestic issuer counts as foreign.
    pub async fn classify_nationality(&self, ticker: &str) -> Domesticity {
        self.limiter.acquire(NATIONALITY_KEY).await;
        match self.source.country(ticker).await {
            Ok(Some(country)) if country.trim().eq_ignore_ascii_case(DOMESTIC_COUNTRY) => {
                Domesticity::Domestic
            }
            Ok(country) => {
                debug!("{} issuer country {:?}", ticker, country);
                Domesticity::Foreign
            }
            Err(e) => {
                warn!("Country lookup failed for {}, treating as foreign: {}", ticker, e);
                Domesticity::Foreign
            }
        }
    }

    pub async fn classify(&self, ticker: &str) -> Symbol {
        let mut symbol = Symbol::new(ticker);
        let Ok(_permit) = self.workers.acquire().await else {
            symbol.message = "validator shut down".to_string();
            return symbol;
        };

        let (validity, message) = self.validate(&symbol.ticker).await;
        symbol.validity = validity;
        symbol.message = message;
        if symbol.is_valid() {
            symbol.domesticity = self.classify_nationality(&symbol.ticker).await;
        }
        symbol
    }

    /// One classified `Symbol` per distinct ticker, in input order.
    pub async fn classify_all<S: AsRef<str>>(&self, inputs: &[S]) -> Vec<Symbol> {
        let tickers = parse_ticker_list(inputs);
        let symbols = join_all(tickers.iter().map(|t| self.classify(t))).await;
        let valid = symbols.iter().filter(|s| s.is_valid()).count();
        let domestic = symbols.iter().filter(|s| s.is_domestic()).count();
        info!(
            "Classified {} symbols: {} valid, {} domestic",
            symbols.len(),
            valid,
            domestic
        );
        symbols
    }
}

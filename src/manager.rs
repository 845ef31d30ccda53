// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Run state machine and phase sequencing.
//!
//! A run classifies its symbols, builds one workbook per symbol and template,
//! then walks the phases in order. Each phase fetches its categories for all
//! symbols at once and applies the results symbol by symbol, so only distinct
//! symbols are ever in flight together.

use anyhow::Result;
use clap::ValueEnum;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{MarketData, OptionChainSource};
use crate::models::{Category, RawCategoryResult, Symbol};
use crate::processor::{self, EARNINGS_KEY, FAILURE_PREFIX};
use crate::rate_limiter::RateLimiter;
use crate::report::StatusEntry;
use crate::scrape::Scraper;
use crate::templates;
use crate::validator::Validator;
use crate::workbook::{TemplateKind, Workbook};

pub const MARKET_KEY: &str = "market-data";
pub const EARNINGS_LIMIT_KEY: &str = "earnings";
pub const CHAIN_KEY: &str = "option-chain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Phase {
    Summary,
    Financials,
    Ratios,
    MarketData,
    EarningsDates,
    OptionChains,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Summary,
        Phase::Financials,
        Phase::Ratios,
        Phase::MarketData,
        Phase::EarningsDates,
        Phase::OptionChains,
    ];

    pub fn categories(&self) -> &'static [Category] {
        match self {
            Phase::Summary => &[
                Category::Summary,
                Category::PerShareMetrics,
                Category::RevenueGrowth,
                Category::CostOfCapital,
            ],
            Phase::Financials => &[Category::Financials],
            Phase::Ratios => &[Category::Ratios],
            Phase::MarketData => &[Category::MarketData],
            Phase::EarningsDates => &[Category::EarningsDates],
            Phase::OptionChains => &[Category::OptionChain],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Summary => "summary",
            Phase::Financials => "financials",
            Phase::Ratios => "ratios",
            Phase::MarketData => "market data",
            Phase::EarningsDates => "earnings dates",
            Phase::OptionChains => "option chains",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Unvalidated,
    Classified,
    TemplatesInitialized,
    InPhase(Phase),
    Persisted,
}

type WorkbookKey = (String, TemplateKind);

pub struct Manager {
    scraper: Scraper,
    validator: Validator,
    market: Arc<dyn MarketData>,
    chains: Option<Arc<dyn OptionChainSource>>,
    limiter: Arc<RateLimiter>,
    output_dir: PathBuf,
    save_each_phase: bool,
    state: RunState,
    symbols: Vec<Symbol>,
    workbooks: BTreeMap<WorkbookKey, Workbook>,
    /// Workbooks changed since they were last saved
    touched: BTreeSet<WorkbookKey>,
    saved: BTreeMap<WorkbookKey, PathBuf>,
    paywalled: HashSet<String>,
    statuses: Vec<StatusEntry>,
}

impl Manager {
    pub fn new(
        scraper: Scraper,
        validator: Validator,
        market: Arc<dyn MarketData>,
        limiter: Arc<RateLimiter>,
        output_dir: &Path,
    ) -> Self {
        Self {
            scraper,
            validator,
            market,
            chains: None,
            limiter,
            output_dir: output_dir.to_path_buf(),
            save_each_phase: true,
            state: RunState::Unvalidated,
            symbols: Vec::new(),
            workbooks: BTreeMap::new(),
            touched: BTreeSet::new(),
            saved: BTreeMap::new(),
            paywalled: HashSet::new(),
            statuses: Vec::new(),
        }
    }

    pub fn with_option_chains(mut self, source: Arc<dyn OptionChainSource>) -> Self {
        self.chains = Some(source);
        self
    }

    pub fn save_each_phase(mut self, enabled: bool) -> Self {
        self.save_each_phase = enabled;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn statuses(&self) -> &[StatusEntry] {
        &self.statuses
    }

    pub fn saved_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.saved.values()
    }

    pub fn workbook(&self, ticker: &str, kind: TemplateKind) -> Option<&Workbook> {
        self.workbooks.get(&(ticker.to_string(), kind))
    }

    /// The whole pipeline: classify, build templates, every phase, persist.
    pub async fn run<S: AsRef<str>>(&mut self, tickers: &[S], phases: &[Phase]) -> Result<()> {
        self.classify(tickers).await;
        self.init_templates()?;
        let mut phases = phases.to_vec();
        phases.sort();
        phases.dedup();
        for phase in phases {
            self.run_phase(phase).await?;
        }
        self.persist();
        self.scraper.shutdown().await;
        Ok(())
    }

    pub async fn classify<S: AsRef<str>>(&mut self, tickers: &[S]) -> &[Symbol] {
        self.symbols = self.validator.classify_all(tickers).await;
        for symbol in &self.symbols {
            if symbol.is_valid() {
                self.statuses.push(StatusEntry::ok(
                    &symbol.ticker,
                    "validate",
                    format!("{} ({})", symbol.message, symbol.domesticity),
                ));
            } else {
                warn!("Skipping {}: {}", symbol.ticker, symbol.message);
                self.statuses
                    .push(StatusEntry::failed(&symbol.ticker, "validate", symbol.message.clone()));
            }
        }
        self.state = RunState::Classified;
        &self.symbols
    }

    pub fn init_templates(&mut self) -> Result<()> {
        if self.state == RunState::Unvalidated {
            anyhow::bail!("symbols must be classified before templates are initialised");
        }
        for symbol in self.symbols.iter().filter(|s| s.is_valid()) {
            for kind in [TemplateKind::Fundamentals, TemplateKind::Options] {
                self.workbooks
                    .entry((symbol.ticker.clone(), kind))
                    .or_insert_with(|| templates::new_workbook(&symbol.ticker, kind));
            }
        }
        self.state = RunState::TemplatesInitialized;
        Ok(())
    }

    /// Fetch and apply every category of `phase`. Re-running a phase
    /// rewrites the same regions.
    pub async fn run_phase(&mut self, phase: Phase) -> Result<()> {
        if matches!(self.state, RunState::Unvalidated | RunState::Classified) {
            anyhow::bail!("templates must be initialised before the {} phase", phase);
        }
        self.state = RunState::InPhase(phase);
        info!("Starting {} phase", phase);

        let valid: Vec<Symbol> = self.symbols.iter().filter(|s| s.is_valid()).cloned().collect();
        let progress = progress_bar((valid.len() * phase.categories().len()) as u64);
        for &category in phase.categories() {
            progress.set_message(category.to_string());
            let mut results = self.fetch(category, &valid).await;
            for symbol in &valid {
                let raw = results.remove(&symbol.ticker);
                self.apply(category, symbol, raw);
                progress.inc(1);
            }
        }
        progress.finish_with_message(format!("{} done", phase));

        if self.save_each_phase {
            self.save_touched(false);
        }
        Ok(())
    }

    /// Save every workbook with unsaved changes and finish the run.
    pub fn persist(&mut self) {
        self.save_touched(true);
        self.state = RunState::Persisted;
    }

    fn save_touched(&mut self, record_success: bool) {
        for key in std::mem::take(&mut self.touched) {
            let Some(workbook) = self.workbooks.remove(&key) else {
                continue;
            };
            let (workbook, result) = processor::persist(workbook, &self.output_dir);
            self.workbooks.insert(key.clone(), workbook);
            match result {
                Ok(path) => {
                    info!("Saved {}", path.display());
                    if record_success {
                        self.statuses
                            .push(StatusEntry::ok(&key.0, "persist", path.display().to_string()));
                    }
                    self.saved.insert(key, path);
                }
                Err(message) => {
                    warn!("{}", message);
                    self.statuses.push(StatusEntry::failed(&key.0, "persist", message));
                    // try again at the next save
                    self.touched.insert(key);
                }
            }
        }
    }

    fn skip_reason(&self, category: Category, symbol: &Symbol) -> Option<RawCategoryResult> {
        if !category.is_domestic_only() {
            return None;
        }
        if self.paywalled.contains(&symbol.ticker) {
            return Some(RawCategoryResult::Paywalled);
        }
        // the processor clears foreign symbols on its own
        None
    }

    fn should_fetch(&self, category: Category, symbol: &Symbol) -> bool {
        if category.is_domestic_only() {
            return symbol.is_domestic() && !self.paywalled.contains(&symbol.ticker);
        }
        true
    }

    async fn fetch(&self, category: Category, symbols: &[Symbol]) -> HashMap<String, RawCategoryResult> {
        let mut results: HashMap<String, RawCategoryResult> = symbols
            .iter()
            .filter_map(|s| self.skip_reason(category, s).map(|r| (s.ticker.clone(), r)))
            .collect();

        let tickers: Vec<String> = symbols
            .iter()
            .filter(|s| self.should_fetch(category, s))
            .map(|s| s.ticker.clone())
            .collect();
        if tickers.is_empty() {
            return results;
        }

        let fetched = match category {
            Category::MarketData => join_all(tickers.iter().map(|t| self.fetch_market_data(t))).await,
            Category::EarningsDates => join_all(tickers.iter().map(|t| self.fetch_earnings_dates(t))).await,
            Category::OptionChain => join_all(tickers.iter().map(|t| self.fetch_option_chain(t))).await,
            _ => self.scraper.fetch_many(&tickers, category).await,
        };
        results.extend(fetched);
        results
    }

    async fn fetch_market_data(&self, ticker: &str) -> (String, RawCategoryResult) {
        self.limiter.acquire(MARKET_KEY).await;
        let raw = match self.market.quote_fields(ticker).await {
            Ok(fields) => RawCategoryResult::Structured(fields),
            Err(e) => RawCategoryResult::Error(format!("Failed to fetch market data for {}: {}", ticker, e)),
        };
        (ticker.to_string(), raw)
    }

    async fn fetch_earnings_dates(&self, ticker: &str) -> (String, RawCategoryResult) {
        self.limiter.acquire(EARNINGS_LIMIT_KEY).await;
        let raw = match self.market.earnings_dates(ticker).await {
            Ok(dates) => {
                let dates = dates
                    .iter()
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .collect();
                let mut map = Map::new();
                map.insert(EARNINGS_KEY.to_string(), Value::Array(dates));
                RawCategoryResult::Structured(map)
            }
            Err(e) => RawCategoryResult::Error(format!("Failed to fetch earnings dates for {}: {}", ticker, e)),
        };
        (ticker.to_string(), raw)
    }

    async fn fetch_option_chain(&self, ticker: &str) -> (String, RawCategoryResult) {
        let Some(source) = self.chains.as_ref() else {
            return (
                ticker.to_string(),
                RawCategoryResult::Error(format!(
                    "Failed to fetch option chain for {}: no brokerage access configured",
                    ticker
                )),
            );
        };
        self.limiter.acquire(CHAIN_KEY).await;
        let raw = match source.option_chain(ticker).await {
            Ok(chain) => RawCategoryResult::Structured(chain),
            Err(e) => RawCategoryResult::Error(format!("Failed to fetch option chain for {}: {}", ticker, e)),
        };
        (ticker.to_string(), raw)
    }

    fn apply(&mut self, category: Category, symbol: &Symbol, raw: Option<RawCategoryResult>) {
        if category == Category::Summary && raw.as_ref().is_some_and(RawCategoryResult::is_paywalled) {
            info!("{} is paywalled; financials and ratios will only be cleared", symbol.ticker);
            self.paywalled.insert(symbol.ticker.clone());
        }

        let failed_fetch = matches!(raw, Some(RawCategoryResult::Error(_)));
        let kind = templates::template_for(category);
        let key = (symbol.ticker.clone(), kind);
        let workbook = self
            .workbooks
            .remove(&key)
            .unwrap_or_else(|| templates::new_workbook(&symbol.ticker, kind));

        let (workbook, message) = processor::process(category, symbol, raw, workbook);
        self.workbooks.insert(key.clone(), workbook);
        self.touched.insert(key);

        let step = category.name();
        if failed_fetch || message.starts_with(FAILURE_PREFIX) {
            self.statuses.push(StatusEntry::failed(&symbol.ticker, step, message));
        } else {
            self.statuses.push(StatusEntry::ok(&symbol.ticker, step, message));
        }
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let progress = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress
}

// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub symbols: Vec<String>,
    pub output_dir: PathBuf,
    /// Save every touched workbook at the end of each phase
    pub save_each_phase: bool,
    pub scraper: ScraperConfig,
    pub rate_limit: RateLimitConfig,
    pub validator: ValidatorConfig,
    pub sources: SourcesConfig,
    pub broker: BrokerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["AAPL".to_string(), "MSFT".to_string(), "NKE".to_string()],
            output_dir: PathBuf::from("output"),
            save_each_phase: true,
            scraper: ScraperConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validator: ValidatorConfig::default(),
            sources: SourcesConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Browsing contexts open at the same time
    pub concurrency: usize,
    pub max_retries: u32,
    pub navigation_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Random pause before every navigation, in milliseconds
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub headless: bool,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 3,
            navigation_timeout_secs: 30,
            element_timeout_secs: 45,
            http_timeout_secs: 30,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        }
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub interval_ms: u64,
    pub jitter_ms: u64,
    /// Per-key interval overrides, e.g. `yahoo-quote = 2000`
    pub overrides: std::collections::HashMap<String, u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            jitter_ms: 500,
            overrides: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub workers: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Where and how one category is scraped. `{symbol}` in a URL template is
/// replaced with the upper-case ticker, `{symbol_lower}` with the lower-case one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSource {
    pub urls: Vec<String>,
    /// Element that only appears once the data has rendered
    pub data_selector: String,
    /// Element that only appears when the data sits behind a paywall
    pub paywall_selector: String,
}

impl PageSource {
    fn new(urls: &[&str], data_selector: &str, paywall_selector: &str) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            data_selector: data_selector.to_string(),
            paywall_selector: paywall_selector.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// JSON API with a row labelled `Revenue`
    pub growth_url: String,
    /// HTML page showing the weighted average cost of capital
    pub wacc_url: String,
    pub wacc_selector: String,
    pub summary: PageSource,
    pub financials: PageSource,
    pub ratios: PageSource,
    pub per_share: PageSource,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let paywall = "div[data-paywall], .paywall";
        Self {
            growth_url: "https://stockanalysis.com/api/symbol/s/{symbol_lower}/financials?type=growth".to_string(),
            wacc_url: "https://www.gurufocus.com/term/wacc/{symbol}".to_string(),
            wacc_selector: "font[style*='font-size: 24px'], div.term-value".to_string(),
            summary: PageSource::new(
                &["https://stockanalysis.com/stocks/{symbol_lower}/"],
                "table[data-test='overview-info']",
                paywall,
            ),
            financials: PageSource::new(
                &[
                    "https://stockanalysis.com/stocks/{symbol_lower}/financials/",
                    "https://stockanalysis.com/stocks/{symbol_lower}/financials/balance-sheet/",
                    "https://stockanalysis.com/stocks/{symbol_lower}/financials/cash-flow-statement/",
                ],
                "table[data-test='financials']",
                paywall,
            ),
            ratios: PageSource::new(
                &["https://stockanalysis.com/stocks/{symbol_lower}/financials/ratios/"],
                "table[data-test='financials']",
                paywall,
            ),
            per_share: PageSource::new(
                &["https://www.gurufocus.com/stock/{symbol}/summary"],
                "table.stock-indicator-table",
                "div.paywall-mask",
            ),
        }
    }
}

impl SourcesConfig {
    pub fn page(&self, category: Category) -> Option<&PageSource> {
        match category {
            Category::Summary => Some(&self.summary),
            Category::Financials => Some(&self.financials),
            Category::Ratios => Some(&self.ratios),
            Category::PerShareMetrics => Some(&self.per_share),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    /// Environment variable holding the bearer token
    pub token_env: String,
    pub strike_count: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.schwabapi.com/marketdata/v1".to_string(),
            token_env: "BROKER_ACCESS_TOKEN".to_string(),
            strike_count: 20,
        }
    }
}

pub fn expand_url(template: &str, symbol: &str) -> String {
    template
        .replace("{symbol_lower}", &symbol.to_lowercase())
        .replace("{symbol}", symbol)
}

fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

/// Load `config.toml` (or `path`); a missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !config_path.exists() {
        if path.is_some() {
            anyhow::bail!("config file {} not found", config_path.display());
        }
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;
    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    let config_str = toml::to_string_pretty(config)?;
    fs::write(path, config_str)?;
    Ok(())
}

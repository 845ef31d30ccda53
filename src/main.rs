// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

mod api;
mod browser;
mod config;
mod error;
mod extract;
mod manager;
mod models;
mod processor;
mod rate_limiter;
mod report;
mod scrape;
mod store;
mod templates;
mod utils;
mod validator;
mod workbook;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::{BrokerClient, MarketData, YahooClient};
use crate::browser::ChromeEngine;
use crate::config::{load_config, save_config, Config};
use crate::manager::{Manager, Phase};
use crate::rate_limiter::RateLimiter;
use crate::scrape::Scraper;
use crate::validator::Validator;

#[derive(Parser)]
#[command(author, version, about = "Collect stock fundamentals into per-symbol workbooks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every phase (or the chosen ones) and write the workbooks
    Run {
        /// Tickers, comma or space separated; defaults to the config list
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Phases to run, e.g. `summary,market-data`
        #[arg(long, value_enum, value_delimiter = ',')]
        phases: Vec<Phase>,
    },
    /// Only classify the symbols and print the result
    Validate {
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "config.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            symbols,
            output_dir,
            config,
            phases,
        } => run(symbols, output_dir, config.as_deref(), phases).await?,
        Commands::Validate { symbols, config } => validate(symbols, config.as_deref()).await?,
        Commands::InitConfig { path } => {
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            save_config(&Config::default(), &path)?;
            println!("✅ Default configuration written to {}", path.display());
        }
    }

    Ok(())
}

fn build_limiter(config: &Config) -> Arc<RateLimiter> {
    let rate = &config.rate_limit;
    let limiter = rate.overrides.iter().fold(
        RateLimiter::new(
            Duration::from_millis(rate.interval_ms),
            Duration::from_millis(rate.jitter_ms),
        ),
        |limiter, (key, ms)| limiter.with_interval(key, Duration::from_millis(*ms)),
    );
    Arc::new(limiter)
}

fn symbols_or_default(symbols: Vec<String>, config: &Config) -> Vec<String> {
    if symbols.is_empty() {
        config.symbols.clone()
    } else {
        symbols
    }
}

async fn run(
    symbols: Vec<String>,
    output_dir: Option<PathBuf>,
    config_path: Option<&Path>,
    phases: Vec<Phase>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let symbols = symbols_or_default(symbols, &config);
    let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
    let phases = if phases.is_empty() {
        Phase::ALL.to_vec()
    } else {
        phases
    };

    let limiter = build_limiter(&config);
    let market: Arc<dyn MarketData> = Arc::new(YahooClient::new(
        &config.scraper.user_agent,
        config.scraper.http_timeout(),
    )?);

    println!("Launching browser...");
    let engine = ChromeEngine::launch(config.scraper.headless, &config.scraper.user_agent)
        .await
        .context("Failed to launch browser")?;
    println!("✅ Browser launched");

    let scraper = Scraper::new(
        Arc::new(engine),
        limiter.clone(),
        config.scraper.clone(),
        config.sources.clone(),
    )?;
    let validator = Validator::new(market.clone(), limiter.clone(), config.validator.workers);
    let mut manager = Manager::new(scraper, validator, market, limiter, &output_dir)
        .save_each_phase(config.save_each_phase);

    if phases.contains(&Phase::OptionChains) {
        match BrokerClient::from_config(&config.broker, config.scraper.http_timeout()) {
            Ok(client) => manager = manager.with_option_chains(Arc::new(client)),
            Err(e) => println!("⚠️  {}; option chain regions will only be cleared", e),
        }
    }

    println!(
        "Processing {} symbols through {} phases...",
        symbols.len(),
        phases.len()
    );
    manager.run(&symbols, &phases).await?;

    let failed: Vec<_> = manager.statuses().iter().filter(|s| !s.ok).collect();
    if !failed.is_empty() {
        println!("\nFailed steps ({}):", failed.len());
        for entry in &failed {
            println!("  {} [{}] - {}", entry.symbol, entry.step, entry.message);
        }
    }

    let saved = manager.saved_files().count();
    println!("✅ {} workbooks saved to {}", saved, output_dir.display());
    let report = report::write_status_report(&output_dir, manager.statuses())?;
    println!("✅ Status report written to {}", report.display());
    Ok(())
}

async fn validate(symbols: Vec<String>, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let symbols = symbols_or_default(symbols, &config);
    let limiter = build_limiter(&config);
    let market: Arc<dyn MarketData> = Arc::new(YahooClient::new(
        &config.scraper.user_agent,
        config.scraper.http_timeout(),
    )?);
    let validator = Validator::new(market, limiter, config.validator.workers);

    let classified = validator.classify_all(&symbols).await;
    println!("{:<10} {:<8} {:<9} Message", "Symbol", "Valid", "Origin");
    for symbol in &classified {
        println!(
            "{:<10} {:<8} {:<9} {}",
            symbol.ticker,
            if symbol.is_valid() { "yes" } else { "no" },
            symbol.domesticity.to_string(),
            symbol.message
        );
    }
    let valid = classified.iter().filter(|s| s.is_valid()).count();
    println!("✅ {} of {} symbols valid", valid, classified.len());
    Ok(())
}

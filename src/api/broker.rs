// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::models::OptionChainHeader;

#[async_trait]
pub trait OptionChainSource: Send + Sync {
    /// The full chain document for `symbol`
    async fn option_chain(&self, symbol: &str) -> Result<Map<String, Value>>;
}

/// Brokerage market-data REST client. The access token comes from the
/// environment; obtaining and refreshing it happens elsewhere.
pub struct BrokerClient {
    client: Client,
    base_url: String,
    token: String,
    strike_count: u32,
}

impl BrokerClient {
    pub fn from_config(config: &BrokerConfig, timeout: Duration) -> Result<Self> {
        let token = env::var(&config.token_env)
            .with_context(|| format!("{} must be set", config.token_env))?;
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            strike_count: config.strike_count,
        })
    }
}

#[async_trait]
impl OptionChainSource for BrokerClient {
    async fn option_chain(&self, symbol: &str) -> Result<Map<String, Value>> {
        let url = format!("{}/chains", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("symbol", symbol.to_string()),
                ("strikeCount", self.strike_count.to_string()),
            ])
            .send()
            .await
            .context("Failed to send option chain request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to get response text")?;
        if !status.is_success() {
            anyhow::bail!("Option chain request failed ({}): {}", status, text);
        }

        let chain: Map<String, Value> =
            serde_json::from_str(&text).context("Failed to parse option chain response")?;
        check_chain(&chain)?;
        Ok(chain)
    }
}

fn check_chain(chain: &Map<String, Value>) -> Result<()> {
    let header: OptionChainHeader = serde_json::from_value(Value::Object(chain.clone()))
        .context("Option chain response has an unexpected shape")?;
    let symbol = header.symbol.unwrap_or_default();
    if header.status.as_deref() == Some("FAILED") {
        anyhow::bail!("No option chain for {}", symbol);
    }
    debug!(
        "Option chain for {} has {} contracts",
        symbol,
        header.number_of_contracts.unwrap_or_default()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_chain_is_an_error() {
        let chain = json!({"symbol": "ZZZZ", "status": "FAILED", "numberOfContracts": 0});
        let err = check_chain(chain.as_object().unwrap()).unwrap_err();
        assert!(err.to_string().contains("ZZZZ"));
    }

    #[test]
    fn test_successful_chain_passes() {
        let chain = json!({"symbol": "AAPL", "status": "SUCCESS", "callExpDateMap": {}});
        assert!(check_chain(chain.as_object().unwrap()).is_ok());
    }

    #[test]
    fn test_missing_token_is_reported() {
        let config = BrokerConfig {
            token_env: "FUNDAMENTALS_SCRAPER_TEST_UNSET_TOKEN".to_string(),
            ..BrokerConfig::default()
        };
        let err = BrokerClient::from_config(&config, Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(err.to_string().contains("FUNDAMENTALS_SCRAPER_TEST_UNSET_TOKEN"));
    }
}

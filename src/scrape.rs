// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use futures::future::join_all;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::browser::{BrowserEngine, BrowserTab};
use crate::config::{expand_url, PageSource, ScraperConfig, SourcesConfig};
use crate::error::FetchError;
use crate::extract;
use crate::models::{Category, RawCategoryResult};
use crate::rate_limiter::RateLimiter;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a single attempt came back with
enum Attempt {
    Done(RawCategoryResult),
    Paywalled,
}

/// Which marker showed up first
enum Marker {
    Data,
    Paywall,
}

pub struct Scraper {
    engine: Arc<dyn BrowserEngine>,
    http: Client,
    limiter: Arc<RateLimiter>,
    gate: Arc<Semaphore>,
    config: ScraperConfig,
    sources: SourcesConfig,
}

impl Scraper {
    pub fn new(
        engine: Arc<dyn BrowserEngine>,
        limiter: Arc<RateLimiter>,
        config: ScraperConfig,
        sources: SourcesConfig,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout())
            .build()?;
        let gate = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Ok(Self {
            engine,
            http,
            limiter,
            gate,
            config,
            sources,
        })
    }

    /// Close the browser engine; called once at the end of a run.
    pub async fn shutdown(&self) {
        if let Err(e) = self.engine.shutdown().await {
            warn!("Failed to shut down browser: {}", e);
        }
    }

    /// Fetch one category for many symbols; results keep the symbol they belong to.
    pub async fn fetch_many(&self, symbols: &[String], category: Category) -> Vec<(String, RawCategoryResult)> {
        let tasks = symbols.iter().map(|symbol| async move {
            let result = self.fetch(symbol, category).await;
            (symbol.clone(), result)
        });
        join_all(tasks).await
    }

    /// Never fails: errors come back as `RawCategoryResult::Error`.
    pub async fn fetch(&self, symbol: &str, category: Category) -> RawCategoryResult {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = match category {
                Category::RevenueGrowth => self.fetch_growth(symbol).await.map(Attempt::Done),
                Category::CostOfCapital => self.fetch_wacc(symbol).await.map(Attempt::Done),
                _ => match self.sources.page(category) {
                    Some(source) => self.fetch_page(symbol, category, source).await,
                    None => {
                        return RawCategoryResult::Error(format!(
                            "{} is not scraped from the web (symbol {})",
                            category, symbol
                        ))
                    }
                },
            };

            match outcome {
                Ok(Attempt::Done(result)) => {
                    debug!("Fetched {} for {} on attempt {}", category, symbol, attempt);
                    return result;
                }
                Ok(Attempt::Paywalled) => {
                    info!("{} for {} is behind a paywall", category, symbol);
                    return RawCategoryResult::Paywalled;
                }
                Err(e) if !e.is_retryable() => {
                    return RawCategoryResult::Error(format!("{} for {}", e, symbol));
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {} {} failed: {}",
                        attempt, max_attempts, symbol, category, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        RawCategoryResult::Error(format!(
            "Failed to fetch {} for {}: {}",
            category, symbol, last_error
        ))
    }

    async fn pre_navigation_pause(&self) {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        let ms = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    /// One attempt over all pages of a category inside one browsing context.
    async fn fetch_page(
        &self,
        symbol: &str,
        category: Category,
        source: &PageSource,
    ) -> Result<Attempt, FetchError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let mut tab = self.engine.open_tab().await?;
        let outcome = self.visit_pages(tab.as_mut(), symbol, category, source).await;
        if let Err(e) = tab.close().await {
            warn!("Failed to close browsing context for {}: {}", symbol, e);
        }
        outcome
    }

    async fn visit_pages(
        &self,
        tab: &mut dyn BrowserTab,
        symbol: &str,
        category: Category,
        source: &PageSource,
    ) -> Result<Attempt, FetchError> {
        let mut tables = Vec::new();
        let mut fields = serde_json::Map::new();

        for template in &source.urls {
            let url = expand_url(template, symbol);
            self.pre_navigation_pause().await;
            self.limiter.acquire(&host_key(&url)).await;

            debug!("Navigating to {}", url);
            timeout(self.config.navigation_timeout(), tab.goto(&url))
                .await
                .map_err(|_| FetchError::Timeout(self.config.navigation_timeout(), url.clone()))??;

            match self.wait_for_marker(tab, source).await? {
                Marker::Paywall => return Ok(Attempt::Paywalled),
                Marker::Data => {}
            }

            let html = tab.content().await?;
            if category == Category::PerShareMetrics {
                for (k, v) in extract::parse_label_values(&html, &source.data_selector)? {
                    fields.entry(k).or_insert(v);
                }
            } else {
                tables.extend(extract::parse_tables(&html, &source.data_selector)?);
            }
        }

        if category == Category::PerShareMetrics {
            Ok(Attempt::Done(RawCategoryResult::Structured(fields)))
        } else {
            Ok(Attempt::Done(RawCategoryResult::Tables(tables)))
        }
    }

    /// Poll until the data table or the paywall marker is present. A rendered
    /// data table wins over a paywall marker elsewhere on the page.
    async fn wait_for_marker(&self, tab: &mut dyn BrowserTab, source: &PageSource) -> Result<Marker, FetchError> {
        let limit = self.config.element_timeout();
        let deadline = Instant::now() + limit;
        loop {
            if tab.has_element(&source.data_selector).await? {
                return Ok(Marker::Data);
            }
            if tab.has_element(&source.paywall_selector).await? {
                return Ok(Marker::Paywall);
            }
            if Instant::now() >= deadline {
                return Err(FetchError::Timeout(limit, source.data_selector.clone()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.pre_navigation_pause().await;
        self.limiter.acquire(&host_key(url)).await;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    async fn fetch_growth(&self, symbol: &str) -> Result<RawCategoryResult, FetchError> {
        let url = expand_url(&self.sources.growth_url, symbol);
        let text = self.get_text(&url).await?;
        let doc: Value = serde_json::from_str(&text).map_err(|e| FetchError::Parse(e.to_string()))?;
        let value = extract::find_revenue_growth(&doc)?;
        Ok(RawCategoryResult::Scalar(value))
    }

    async fn fetch_wacc(&self, symbol: &str) -> Result<RawCategoryResult, FetchError> {
        let url = expand_url(&self.sources.wacc_url, symbol);
        let html = self.get_text(&url).await?;
        let value = extract::find_percentage(&html, &self.sources.wacc_selector)?;
        Ok(RawCategoryResult::Scalar(value))
    }
}

/// Rate-limiter key for a URL: its host
pub fn host_key(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// How the fake page behaves on each navigation
    #[derive(Clone)]
    enum Script {
        Data(&'static str),
        Paywall,
        NavigationFails,
        NeverRenders,
    }

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
        navigations: AtomicUsize,
        open_now: AtomicUsize,
        max_open: AtomicUsize,
    }

    struct FakeEngine {
        scripts: Mutex<VecDeque<Script>>,
        counters: Arc<Counters>,
    }

    impl FakeEngine {
        fn new(scripts: Vec<Script>) -> (Arc<Self>, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            (
                Arc::new(Self {
                    scripts: Mutex::new(scripts.into()),
                    counters: counters.clone(),
                }),
                counters,
            )
        }
    }

    struct FakeTab {
        scripts: Vec<Script>,
        current: Option<Script>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl BrowserEngine for FakeEngine {
        async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, FetchError> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            let now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_open.fetch_max(now, Ordering::SeqCst);
            let mut scripts = self.scripts.lock().unwrap();
            // one script per tab; the last one repeats
            let next = if scripts.len() > 1 {
                scripts.pop_front()
            } else {
                scripts.front().cloned()
            };
            Ok(Box::new(FakeTab {
                scripts: next.into_iter().collect(),
                current: None,
                counters: self.counters.clone(),
            }))
        }

        async fn shutdown(&self) -> Result<(), FetchError> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserTab for FakeTab {
        async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
            self.counters.navigations.fetch_add(1, Ordering::SeqCst);
            // let other tabs run so the concurrency gate gets exercised
            tokio::time::sleep(Duration::from_millis(10)).await;
            let script = self.scripts.first().cloned().unwrap_or(Script::NeverRenders);
            if let Script::NavigationFails = script {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
            self.current = Some(script);
            Ok(())
        }

        async fn has_element(&mut self, selector: &str) -> Result<bool, FetchError> {
            Ok(match &self.current {
                Some(Script::Paywall) => selector == "div.paywall",
                Some(Script::Data(_)) => selector == "table.data",
                _ => false,
            })
        }

        async fn content(&mut self) -> Result<String, FetchError> {
            match &self.current {
                Some(Script::Data(html)) => Ok(html.to_string()),
                _ => Err(FetchError::Browser("no content".to_string())),
            }
        }

        async fn close(self: Box<Self>) -> Result<(), FetchError> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    const TABLE: &str = r#"<table class="data"><thead><tr><th>Item</th><th>2023</th></tr></thead>
        <tbody><tr><td>Revenue</td><td>100</td></tr></tbody></table>"#;

    fn source() -> PageSource {
        PageSource {
            urls: vec!["https://pages.test/{symbol_lower}".to_string()],
            data_selector: "table.data".to_string(),
            paywall_selector: "div.paywall".to_string(),
        }
    }

    fn scraper_with(engine: Arc<dyn BrowserEngine>, concurrency: usize, sources: SourcesConfig) -> Scraper {
        let config = ScraperConfig {
            concurrency,
            max_retries: 3,
            navigation_timeout_secs: 5,
            element_timeout_secs: 2,
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..ScraperConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO, Duration::ZERO));
        Scraper::new(engine, limiter, config, sources).unwrap()
    }

    fn scraper(engine: Arc<FakeEngine>, concurrency: usize) -> Scraper {
        let sources = SourcesConfig {
            summary: source(),
            financials: source(),
            ratios: source(),
            per_share: source(),
            ..SourcesConfig::default()
        };
        scraper_with(engine, concurrency, sources)
    }

    /// Serves one fixed HTML document and answers selector queries against it
    struct HtmlEngine {
        html: &'static str,
    }

    struct HtmlTab {
        html: &'static str,
        loaded: bool,
    }

    fn html_has(html: &str, css: &str) -> bool {
        let document = ::scraper::Html::parse_document(html);
        ::scraper::Selector::parse(css)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false)
    }

    #[async_trait]
    impl BrowserEngine for HtmlEngine {
        async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, FetchError> {
            Ok(Box::new(HtmlTab {
                html: self.html,
                loaded: false,
            }))
        }

        async fn shutdown(&self) -> Result<(), FetchError> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserTab for HtmlTab {
        async fn goto(&mut self, _url: &str) -> Result<(), FetchError> {
            self.loaded = true;
            Ok(())
        }

        async fn has_element(&mut self, selector: &str) -> Result<bool, FetchError> {
            Ok(self.loaded && html_has(self.html, selector))
        }

        async fn content(&mut self) -> Result<String, FetchError> {
            Ok(self.html.to_string())
        }

        async fn close(self: Box<Self>) -> Result<(), FetchError> {
            Ok(())
        }
    }

    const FINANCIALS_WITH_PRO_LINK: &str = r#"<html><body>
        <nav><a href="/pro/">Upgrade to Pro</a></nav>
        <table data-test="financials">
          <thead><tr><th>Fiscal Year</th><th>FY 2024</th><th>FY 2023</th></tr></thead>
          <tbody><tr><td>Revenue</td><td>391,035</td><td>383,285</td></tr></tbody>
        </table>
        </body></html>"#;

    const PAYWALL_OVERLAY: &str = r#"<html><body>
        <nav><a href="/pro/">Upgrade to Pro</a></nav>
        <div class="paywall">This data requires a Pro subscription</div>
        </body></html>"#;

    #[tokio::test(start_paused = true)]
    async fn test_data_page_returns_tables() {
        let (engine, counters) = FakeEngine::new(vec![Script::Data(TABLE)]);
        let result = scraper(engine, 1).fetch("AAPL", Category::Financials).await;
        match result {
            RawCategoryResult::Tables(tables) => {
                assert_eq!(tables.len(), 1);
                assert_eq!(tables[0].rows[0], vec!["Revenue", "100"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paywall_short_circuits_without_retry() {
        let (engine, counters) = FakeEngine::new(vec![Script::Paywall]);
        let result = scraper(engine, 1).fetch("ASML", Category::Ratios).await;
        assert!(result.is_paywalled());
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_is_retried_then_reported() {
        let (engine, counters) = FakeEngine::new(vec![Script::NavigationFails]);
        let result = scraper(engine, 1).fetch("AAPL", Category::Summary).await;
        match result {
            RawCategoryResult::Error(msg) => {
                assert!(msg.contains("AAPL"));
                assert!(msg.contains("ERR_CONNECTION_RESET"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 3);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 3);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let (engine, counters) = FakeEngine::new(vec![Script::NeverRenders, Script::Data(TABLE)]);
        let result = scraper(engine, 1).fetch("AAPL", Category::Summary).await;
        assert!(matches!(result, RawCategoryResult::Tables(_)));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_table_is_not_retried() {
        const NO_ROWS: &str = r#"<table class="data"></table>"#;
        let (engine, counters) = FakeEngine::new(vec![Script::Data(NO_ROWS)]);
        let result = scraper(engine, 1).fetch("AAPL", Category::Summary).await;
        match result {
            RawCategoryResult::Error(msg) => assert!(msg.contains("not found")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_share_page_returns_fields() {
        const KV: &str = r#"<table class="data"><tr><td>EPS (Diluted)</td><td>6.13</td></tr></table>"#;
        let (engine, _) = FakeEngine::new(vec![Script::Data(KV)]);
        let result = scraper(engine, 1).fetch("AAPL", Category::PerShareMetrics).await;
        match result {
            RawCategoryResult::Structured(map) => {
                assert_eq!(map.get("EPS (Diluted)"), Some(&Value::String("6.13".into())))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_many_respects_concurrency_gate() {
        let (engine, counters) = FakeEngine::new(vec![Script::Data(TABLE)]);
        let symbols: Vec<String> = ["AAPL", "MSFT", "NVDA", "AMZN", "META"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = scraper(engine, 2).fetch_many(&symbols, Category::Ratios).await;
        assert_eq!(results.len(), 5);
        for (symbol, result) in &results {
            assert!(symbols.contains(symbol));
            assert!(matches!(result, RawCategoryResult::Tables(_)));
        }
        assert!(counters.max_open.load(Ordering::SeqCst) <= 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rendered_data_page_with_pro_link_is_not_paywalled() {
        let engine = Arc::new(HtmlEngine {
            html: FINANCIALS_WITH_PRO_LINK,
        });
        let result = scraper_with(engine, 1, SourcesConfig::default())
            .fetch("AAPL", Category::Financials)
            .await;
        match result {
            RawCategoryResult::Tables(tables) => {
                assert_eq!(tables.len(), 3);
                assert_eq!(tables[0].rows[0][0], "Revenue");
            }
            other => panic!("expected tables, got {}", other.kind()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_paywall_overlay_without_data_is_paywalled() {
        let engine = Arc::new(HtmlEngine { html: PAYWALL_OVERLAY });
        let result = scraper_with(engine, 1, SourcesConfig::default())
            .fetch("ASML", Category::Ratios)
            .await;
        assert!(result.is_paywalled());
    }

    /// Answers every connection with the same canned response
    async fn serve(status: &'static str, content_type: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    content_type,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}", addr), hits)
    }

    fn http_scraper(growth_url: String, wacc_url: String) -> Scraper {
        let (engine, _) = FakeEngine::new(vec![Script::NeverRenders]);
        let sources = SourcesConfig {
            growth_url,
            wacc_url,
            wacc_selector: "div.term-value".to_string(),
            ..SourcesConfig::default()
        };
        scraper_with(engine, 1, sources)
    }

    #[tokio::test]
    async fn test_revenue_growth_from_json_api() {
        let body = r#"{"data": {"rows": [["Net Income", "3%"], ["Revenue", "8.2%", "5.1%"]]}}"#;
        let (base, hits) = serve("200 OK", "application/json", body).await;
        let scraper = http_scraper(format!("{}/growth/{{symbol_lower}}", base), format!("{}/wacc", base));
        let result = scraper.fetch("AAPL", Category::RevenueGrowth).await;
        match result {
            RawCategoryResult::Scalar(value) => assert_eq!(value, "8.2%"),
            other => panic!("expected scalar, got {}", other.kind()),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_revenue_row_is_reported_once() {
        let body = r#"{"data": [{"label": "EBITDA", "values": ["4%"]}]}"#;
        let (base, hits) = serve("200 OK", "application/json", body).await;
        let scraper = http_scraper(format!("{}/growth/{{symbol}}", base), format!("{}/wacc", base));
        let result = scraper.fetch("AAPL", Category::RevenueGrowth).await;
        match result {
            RawCategoryResult::Error(msg) => assert_eq!(msg, "Revenue growth row not found for AAPL"),
            other => panic!("expected error, got {}", other.kind()),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wacc_from_html_page() {
        let body = r#"<html><body><div class="term-value">WACC: 9.47% as of today</div></body></html>"#;
        let (base, hits) = serve("200 OK", "text/html", body).await;
        let scraper = http_scraper(format!("{}/growth", base), format!("{}/wacc/{{symbol}}", base));
        let result = scraper.fetch("MSFT", Category::CostOfCapital).await;
        match result {
            RawCategoryResult::Scalar(value) => assert_eq!(value, "9.47%"),
            other => panic!("expected scalar, got {}", other.kind()),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_wacc_value_is_reported_once() {
        let body = r#"<html><body><div class="term-value">n/a</div></body></html>"#;
        let (base, hits) = serve("200 OK", "text/html", body).await;
        let scraper = http_scraper(format!("{}/growth", base), format!("{}/wacc/{{symbol}}", base));
        let result = scraper.fetch("MSFT", Category::CostOfCapital).await;
        match result {
            RawCategoryResult::Error(msg) => assert_eq!(msg, "WACC value not found for MSFT"),
            other => panic!("expected error, got {}", other.kind()),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_status_is_not_retried() {
        let (base, hits) = serve("404 Not Found", "text/plain", "missing").await;
        let scraper = http_scraper(format!("{}/growth/{{symbol}}", base), format!("{}/wacc", base));
        let result = scraper.fetch("ZZZZ", Category::RevenueGrowth).await;
        match result {
            RawCategoryResult::Error(msg) => {
                assert!(msg.contains("HTTP 404"), "{}", msg);
                assert!(msg.ends_with("for ZZZZ"), "{}", msg);
            }
            other => panic!("expected error, got {}", other.kind()),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (base, hits) = serve("503 Service Unavailable", "text/plain", "busy").await;
        let scraper = http_scraper(format!("{}/growth/{{symbol}}", base), format!("{}/wacc", base));
        let result = scraper.fetch("AAPL", Category::RevenueGrowth).await;
        match result {
            RawCategoryResult::Error(msg) => {
                assert!(msg.starts_with("Failed to fetch"), "{}", msg);
                assert!(msg.contains("503"), "{}", msg);
            }
            other => panic!("expected error, got {}", other.kind()),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_host_key() {
        assert_eq!(host_key("https://stockanalysis.com/stocks/aapl/"), "stockanalysis.com");
        assert_eq!(host_key("not a url"), "not a url");
    }
}

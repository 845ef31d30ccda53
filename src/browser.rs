// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Headless browser seam.
//!
//! One `BrowserEngine` is launched per run. Every request opens its own
//! `BrowserTab`, which lives in a fresh browser context so cookies and
//! storage never leak between symbols.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::FetchError;

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open an isolated context with one blank page in it
    async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, FetchError>;
    async fn shutdown(&self) -> Result<(), FetchError>;
}

#[async_trait]
pub trait BrowserTab: Send {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError>;
    /// Whether at least one element matches `selector` right now
    async fn has_element(&mut self, selector: &str) -> Result<bool, FetchError>;
    async fn content(&mut self) -> Result<String, FetchError>;
    /// Close the page and dispose of its context
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

fn browser_err(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

pub struct ChromeEngine {
    browser: Arc<Mutex<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromeEngine {
    pub async fn launch(headless: bool, user_agent: &str) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder().arg(format!("--user-agent={}", user_agent));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(FetchError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while the handler is polled
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {}", e);
                }
            }
        });

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler: Mutex::new(Some(handle)),
        })
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn open_tab(&self) -> Result<Box<dyn BrowserTab>, FetchError> {
        let browser = self.browser.lock().await;
        let context = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(browser_err)?
            .result
            .browser_context_id;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(FetchError::Browser)?;

        let page = match browser.new_page(params).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(dispose) = browser.execute(DisposeBrowserContextParams::new(context)).await {
                    warn!("Failed to dispose browser context: {}", dispose);
                }
                return Err(browser_err(e));
            }
        };

        Ok(Box::new(ChromeTab {
            browser: self.browser.clone(),
            page: Some(page),
            context,
        }))
    }

    async fn shutdown(&self) -> Result<(), FetchError> {
        {
            let mut browser = self.browser.lock().await;
            browser.close().await.map_err(browser_err)?;
            browser.wait().await.map_err(browser_err)?;
        }
        if let Some(handle) = self.handler.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

struct ChromeTab {
    browser: Arc<Mutex<Browser>>,
    page: Option<Page>,
    context: BrowserContextId,
}

impl ChromeTab {
    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Browser("page already closed".to_string()))
    }
}

#[async_trait]
impl BrowserTab for ChromeTab {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        self.page()?
            .goto(url)
            .await
            .map_err(|e| FetchError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool, FetchError> {
        // find_element reports "no node" as an error
        Ok(self.page()?.find_element(selector).await.is_ok())
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.page()?.content().await.map_err(browser_err)
    }

    async fn close(mut self: Box<Self>) -> Result<(), FetchError> {
        let page_result = match self.page.take() {
            Some(page) => page.close().await.map_err(browser_err),
            None => Ok(()),
        };
        let browser = self.browser.lock().await;
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(self.context.clone()))
            .await
        {
            warn!("Failed to dispose browser context: {}", e);
        }
        page_result
    }
}

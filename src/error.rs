// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use std::time::Duration;
use thiserror::Error;

/// Failures while fetching one page or document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    /// The page loaded but did not have the structure we extract from.
    #[error("{0} not found")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Missing structure will not show up on a second try, nor will a
    /// client error other than 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotFound(_) | FetchError::Parse(_) => false,
            FetchError::Status { status, .. } => *status == 429 || !(400..500).contains(status),
            _ => true,
        }
    }
}

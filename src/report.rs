// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One line of the run status report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub symbol: String,
    /// Category or step name, e.g. `financials` or `persist`
    pub step: String,
    pub ok: bool,
    pub message: String,
}

impl StatusEntry {
    pub fn ok(symbol: &str, step: &str, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            step: step.to_string(),
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(symbol: &str, step: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ..Self::ok(symbol, step, message)
        }
    }
}

/// Write `run_status_<timestamp>.csv` into `output_dir`
pub fn write_status_report(output_dir: &Path, entries: &[StatusEntry]) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = output_dir.join(format!("run_status_{}.csv", timestamp));
    let mut writer = Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(path)
}

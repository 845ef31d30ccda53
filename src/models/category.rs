// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use std::fmt;

/// One kind of data collected per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Summary,
    Financials,
    Ratios,
    PerShareMetrics,
    RevenueGrowth,
    CostOfCapital,
    MarketData,
    EarningsDates,
    OptionChain,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Summary => "summary",
            Category::Financials => "financials",
            Category::Ratios => "ratios",
            Category::PerShareMetrics => "per-share metrics",
            Category::RevenueGrowth => "revenue growth",
            Category::CostOfCapital => "cost of capital",
            Category::MarketData => "market data",
            Category::EarningsDates => "earnings dates",
            Category::OptionChain => "option chain",
        }
    }

    /// Written as year-windowed tables into a rectangular region
    pub fn is_tabular(&self) -> bool {
        matches!(
            self,
            Category::Summary | Category::Financials | Category::Ratios
        )
    }

    /// Only available for free on domestic issuers
    pub fn is_domestic_only(&self) -> bool {
        matches!(self, Category::Financials | Category::Ratios)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

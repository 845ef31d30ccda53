// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::Deserialize;
use serde_json::{Map, Value};

/// Keys of the chain document holding `expiration -> strike -> [contract]` maps
pub const EXPIRATION_MAPS: [&str; 2] = ["callExpDateMap", "putExpDateMap"];

pub const EXPIRATION_COLUMN: &str = "expirationKey";
pub const STRIKE_COLUMN: &str = "strikeKey";
const METADATA_PREFIX: &str = "chain.";

/// The handful of chain fields the client looks at before handing the
/// document over untouched.
#[derive(Debug, Deserialize)]
pub struct OptionChainHeader {
    pub symbol: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "numberOfContracts")]
    pub number_of_contracts: Option<u64>,
}

/// One row per contract, aligned to `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl OptionRows {
    fn column_index(&mut self, name: &str) -> usize {
        match self.columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(None);
                }
                self.columns.len() - 1
            }
        }
    }

    fn push_row(&mut self, fields: Vec<(String, Value)>) {
        let mut row = vec![None; self.columns.len()];
        for (name, value) in fields {
            let idx = self.column_index(&name);
            if idx >= row.len() {
                row.resize(idx + 1, None);
            }
            row[idx] = Some(value);
        }
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }
}

/// Cross join every contract of the chain with the chain-level metadata.
///
/// Each output row holds the expiration key and strike key it was found
/// under, followed by the contract's own fields and then the metadata fields
/// prefixed with `chain.`.
pub fn flatten_option_chain(chain: &Map<String, Value>) -> Result<OptionRows, String> {
    if !EXPIRATION_MAPS.iter().any(|k| chain.contains_key(*k)) {
        return Err("option chain has no expiration maps".to_string());
    }

    let metadata: Vec<(String, Value)> = chain
        .iter()
        .filter(|(k, _)| !EXPIRATION_MAPS.contains(&k.as_str()))
        .map(|(k, v)| (format!("{}{}", METADATA_PREFIX, k), v.clone()))
        .collect();

    let mut out = OptionRows {
        columns: vec![EXPIRATION_COLUMN.to_string(), STRIKE_COLUMN.to_string()],
        rows: Vec::new(),
    };

    for map_key in EXPIRATION_MAPS {
        let Some(expirations) = chain.get(map_key) else {
            continue;
        };
        let expirations = expirations
            .as_object()
            .ok_or_else(|| format!("{} is not an object", map_key))?;

        for (expiration, strikes) in expirations {
            let strikes = strikes
                .as_object()
                .ok_or_else(|| format!("strikes under {} are not an object", expiration))?;
            for (strike, contracts) in strikes {
                let contracts = contracts
                    .as_array()
                    .ok_or_else(|| format!("contracts at {} {} are not a list", expiration, strike))?;
                for contract in contracts {
                    let mut fields = vec![
                        (EXPIRATION_COLUMN.to_string(), Value::String(expiration.clone())),
                        (STRIKE_COLUMN.to_string(), Value::String(strike.clone())),
                    ];
                    match contract {
                        Value::Object(obj) => {
                            fields.extend(obj.iter().map(|(k, v)| (k.clone(), v.clone())));
                        }
                        other => fields.push(("contract".to_string(), other.clone())),
                    }
                    fields.extend(metadata.iter().cloned());
                    out.push_row(fields);
                }
            }
        }
    }

    Ok(out)
}

//! File paths and cell anchors, persisted as a small JSON document.
//!
//! The core only ever reads a [`LedgerConfig`]; loading, saving and resetting
//! happen at this boundary.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::LedgerError, locate::DEFAULT_SCAN_DEPTH};

/// Fixed rows and columns locating each field, all 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Row of the price table carrying the `YYYYMM` block labels.
    pub price_header_row: u32,
    pub price_id_row: u32,
    pub price_row: u32,
    /// Rows checked when deciding that a column is blank.
    pub block_scan_depth: u32,
    pub flat_id_column: u32,
    pub flat_price_column: u32,
    pub flat_first_row: u32,
    pub stock_id_column: u32,
    pub stock_price_column: u32,
    pub stock_data_start_row: u32,
    pub sales_id_column: u32,
    pub sales_amount_column: u32,
    pub sales_quantity_column: u32,
    pub sales_profit_column: u32,
    pub sales_profit_rate_column: u32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            price_header_row: 1,
            price_id_row: 3,
            price_row: 25,
            block_scan_depth: DEFAULT_SCAN_DEPTH,
            flat_id_column: 1,
            flat_price_column: 2,
            flat_first_row: 2,
            stock_id_column: 3,
            stock_price_column: 10,
            stock_data_start_row: 7,
            sales_id_column: 3,
            sales_amount_column: 8,
            sales_quantity_column: 6,
            sales_profit_column: 10,
            sales_profit_rate_column: 11,
        }
    }
}

impl PositionConfig {
    pub const KEYS: [&'static str; 15] = [
        "price_header_row",
        "price_id_row",
        "price_row",
        "block_scan_depth",
        "flat_id_column",
        "flat_price_column",
        "flat_first_row",
        "stock_id_column",
        "stock_price_column",
        "stock_data_start_row",
        "sales_id_column",
        "sales_amount_column",
        "sales_quantity_column",
        "sales_profit_column",
        "sales_profit_rate_column",
    ];

    pub fn get(&self, key: &str) -> Option<u32> {
        let value = match key {
            "price_header_row" => self.price_header_row,
            "price_id_row" => self.price_id_row,
            "price_row" => self.price_row,
            "block_scan_depth" => self.block_scan_depth,
            "flat_id_column" => self.flat_id_column,
            "flat_price_column" => self.flat_price_column,
            "flat_first_row" => self.flat_first_row,
            "stock_id_column" => self.stock_id_column,
            "stock_price_column" => self.stock_price_column,
            "stock_data_start_row" => self.stock_data_start_row,
            "sales_id_column" => self.sales_id_column,
            "sales_amount_column" => self.sales_amount_column,
            "sales_quantity_column" => self.sales_quantity_column,
            "sales_profit_column" => self.sales_profit_column,
            "sales_profit_rate_column" => self.sales_profit_rate_column,
            _ => return None,
        };
        Some(value)
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut u32> {
        let slot = match key {
            "price_header_row" => &mut self.price_header_row,
            "price_id_row" => &mut self.price_id_row,
            "price_row" => &mut self.price_row,
            "block_scan_depth" => &mut self.block_scan_depth,
            "flat_id_column" => &mut self.flat_id_column,
            "flat_price_column" => &mut self.flat_price_column,
            "flat_first_row" => &mut self.flat_first_row,
            "stock_id_column" => &mut self.stock_id_column,
            "stock_price_column" => &mut self.stock_price_column,
            "stock_data_start_row" => &mut self.stock_data_start_row,
            "sales_id_column" => &mut self.sales_id_column,
            "sales_amount_column" => &mut self.sales_amount_column,
            "sales_quantity_column" => &mut self.sales_quantity_column,
            "sales_profit_column" => &mut self.sales_profit_column,
            "sales_profit_rate_column" => &mut self.sales_profit_rate_column,
            _ => return None,
        };
        Some(slot)
    }

    /// Every anchor must be a positive row/column number.
    pub fn validate(&self) -> Result<(), LedgerError> {
        match Self::KEYS.into_iter().find(|key| self.get(key) == Some(0)) {
            Some(key) => Err(LedgerError::InvalidConfig { key }),
            None => Ok(()),
        }
    }
}

/// How the price table is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceLayout {
    /// One block of columns per month, labelled `YYYYMM` in the header row.
    #[default]
    Monthly,
    /// Plain list: identifier and price columns, one item per row.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub price_file: PathBuf,
    pub stock_file: PathBuf,
    pub sales_file: PathBuf,
    /// Tab holding the price table; the active sheet when unset.
    pub price_sheet: Option<String>,
    /// Tab holding the sales ledger; the active sheet when unset.
    pub sales_sheet: Option<String>,
    pub price_layout: PriceLayout,
    pub positions: PositionConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            price_file: PathBuf::from("price_table.xlsx"),
            stock_file: PathBuf::from("stock_ledger.xlsx"),
            sales_file: PathBuf::from("sales_ledger.xlsx"),
            price_sheet: None,
            sales_sheet: None,
            price_layout: PriceLayout::Monthly,
            positions: PositionConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Reads the document at `path`; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("malformed configuration {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text + "\n")
            .with_context(|| format!("cannot write configuration {}", path.display()))
    }

    /// Overwrites `path` with the defaults and returns them.
    pub fn reset<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        self.positions.validate()
    }

    /// Sets one field from its textual form, as typed on the command line.
    /// An empty value clears the optional sheet names.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "price_file" => self.price_file = PathBuf::from(value),
            "stock_file" => self.stock_file = PathBuf::from(value),
            "sales_file" => self.sales_file = PathBuf::from(value),
            "price_sheet" => self.price_sheet = (!value.is_empty()).then(|| value.to_owned()),
            "sales_sheet" => self.sales_sheet = (!value.is_empty()).then(|| value.to_owned()),
            "price_layout" => {
                self.price_layout = match value.to_ascii_lowercase().as_str() {
                    "monthly" => PriceLayout::Monthly,
                    "flat" => PriceLayout::Flat,
                    other => bail!("unknown price layout '{other}' (expected monthly or flat)"),
                }
            }
            _ => {
                let slot = self
                    .positions
                    .slot_mut(key)
                    .with_context(|| format!("unknown configuration key '{key}'"))?;
                let number: u32 = value
                    .parse()
                    .with_context(|| format!("`{key}` expects a positive integer, got '{value}'"))?;
                if number == 0 {
                    bail!("`{key}` expects a positive integer, got 0");
                }
                *slot = number;
            }
        }
        Ok(())
    }
}

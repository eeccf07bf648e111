//! ledger-core: moves a month's unit prices from a price table into the stock
//! ledger and derives per-row profit in the sales ledger.
//!
//! The workbook layer keeps every sheet as a sparse in-memory grid and, on
//! save, patches only the written cells back into the original sheet XML.

mod coord;
mod package_part;
mod sheet_xml;

pub mod config;
pub mod error;
pub mod locate;
pub mod ops;
pub mod period;
pub mod persist;
pub mod price_map;
pub mod profit;
pub mod progress;
pub mod propagate;
pub mod resolve;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::PathBuf,
};

use anyhow::{Result, bail};

pub use config::{LedgerConfig, PositionConfig, PriceLayout};
pub use coord::{cell_ref, col_letter, column_index, parse_cell_ref};
pub use error::{DataConversionError, LedgerError};
pub use package_part::{SheetIndex, scan};
pub use period::{PeriodKey, PeriodToken};
pub use price_map::{Identifier, PriceMap};
pub use progress::{Progress, Stage};

/// Scalar stored in a cell. An absent cell is `None` at the [`Grid`] level.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    /// Empty or whitespace-only text counts as no value.
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }

    /// Numeric reading of the cell, the way a ledger amount is read.
    pub fn as_number(&self) -> std::result::Result<f64, DataConversionError> {
        let number = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| DataConversionError::new(s))?,
            CellValue::Bool(b) => return Err(DataConversionError::new(b.to_string())),
        };
        if number.is_finite() {
            Ok(number)
        } else {
            Err(DataConversionError::new(self.to_string()))
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64's Display drops the fraction of integral values: 202501.0 -> "202501"
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(f64::from(n))
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// 1-indexed rectangular view of a sheet. Everything in the core works
/// against this trait rather than a concrete file format.
pub trait Grid {
    fn cell(&self, row: u32, column: u32) -> Option<&CellValue>;
    fn set_cell(&mut self, row: u32, column: u32, value: CellValue);
    fn max_row(&self) -> u32;
    fn max_column(&self) -> u32;

    /// `true` when the cell holds something other than blank text.
    fn has_value(&self, row: u32, column: u32) -> bool {
        self.cell(row, column).is_some_and(|v| !v.is_blank())
    }
}

/// A named sheet: sparse cells keyed by (row, column), plus the set of cells
/// written since load.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<(u32, u32), CellValue>,
    dirty: BTreeSet<(u32, u32)>,
    max_row: u32,
    max_column: u32,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Number of cells written since the sheet was loaded.
    pub fn written_cells(&self) -> usize {
        self.dirty.len()
    }

    /// Cell loaded from a package: extends the bounds without marking it written.
    pub(crate) fn insert_loaded(&mut self, row: u32, column: u32, value: CellValue) {
        self.grow(row, column);
        self.cells.insert((row, column), value);
    }

    /// Written cells grouped per row then column, the order the XML needs.
    pub(crate) fn dirty_patches(&self) -> BTreeMap<u32, BTreeMap<u32, CellValue>> {
        self.group(self.dirty.iter().copied())
    }

    /// Every cell grouped per row, used when a sheet is written from scratch.
    pub(crate) fn all_patches(&self) -> BTreeMap<u32, BTreeMap<u32, CellValue>> {
        self.group(self.cells.keys().copied())
    }

    fn group(
        &self,
        keys: impl Iterator<Item = (u32, u32)>,
    ) -> BTreeMap<u32, BTreeMap<u32, CellValue>> {
        let mut rows: BTreeMap<u32, BTreeMap<u32, CellValue>> = BTreeMap::new();
        for (row, column) in keys {
            if let Some(value) = self.cells.get(&(row, column)) {
                rows.entry(row).or_default().insert(column, value.clone());
            }
        }
        rows
    }

    fn grow(&mut self, row: u32, column: u32) {
        self.max_row = self.max_row.max(row);
        self.max_column = self.max_column.max(column);
    }
}

impl Grid for Sheet {
    fn cell(&self, row: u32, column: u32) -> Option<&CellValue> {
        self.cells.get(&(row, column))
    }

    fn set_cell(&mut self, row: u32, column: u32, value: CellValue) {
        debug_assert!(row > 0 && column > 0, "cells are 1-indexed");
        self.grow(row, column);
        self.cells.insert((row, column), value);
        self.dirty.insert((row, column));
    }

    fn max_row(&self) -> u32 {
        self.max_row
    }

    fn max_column(&self) -> u32 {
        self.max_column
    }
}

/// Source package of a workbook opened from disk.
#[derive(Debug, Clone)]
pub(crate) struct Package {
    pub(crate) source: PathBuf,
    pub(crate) bytes: Vec<u8>,
    /// Worksheet part per sheet, `None` for chart sheets and other non-grid tabs.
    pub(crate) sheet_parts: Vec<Option<String>>,
}

/// Ordered, named collection of sheets.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    active: usize,
    package: Option<Package>,
}

impl Workbook {
    /// Empty workbook that is written as a fresh package on save.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an empty sheet. Only in-memory workbooks can grow new tabs.
    pub fn add_sheet(&mut self, name: &str) -> Result<&mut Sheet> {
        if self.package.is_some() {
            bail!("cannot add sheet '{name}' to a workbook opened from disk");
        }
        if self.sheets.iter().any(|s| s.name == name) {
            bail!("Sheet {name} already exists");
        }
        self.sheets.push(Sheet::new(name));
        let last = self.sheets.len() - 1;
        Ok(&mut self.sheets[last])
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(Sheet::name)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_at(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_at_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn set_active(&mut self, index: usize) -> Result<()> {
        if index >= self.sheets.len() {
            bail!("sheet index {index} out of range ({} sheets)", self.sheets.len());
        }
        self.active = index;
        Ok(())
    }

    pub fn active_sheet(&self) -> Option<&Sheet> {
        self.sheets.get(self.active)
    }

    pub fn active_sheet_mut(&mut self) -> Option<&mut Sheet> {
        self.sheets.get_mut(self.active)
    }

    /// Path the workbook was opened from, if any.
    pub fn source_path(&self) -> Option<&std::path::Path> {
        self.package.as_ref().map(|p| p.source.as_path())
    }

    pub fn is_dirty(&self) -> bool {
        self.sheets.iter().any(Sheet::is_dirty)
    }
}

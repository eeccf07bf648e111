//! Identifier → unit price lookup built from a price table.

use std::collections::{HashMap, hash_map};

use tracing::debug;

use crate::{CellValue, Grid};

/// Join key between ledgers: the trimmed text of the identifier cell, so a
/// numeric `1001` and a text `"1001"` name the same item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn from_cell(value: &CellValue) -> Option<Self> {
        let text = value.to_string();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.trim().to_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceMap {
    prices: HashMap<Identifier, f64>,
}

impl PriceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts for the same identifier overwrite earlier ones.
    pub fn insert(&mut self, id: Identifier, price: f64) -> Option<f64> {
        self.prices.insert(id, price)
    }

    pub fn get(&self, id: &Identifier) -> Option<f64> {
        self.prices.get(id).copied()
    }

    /// Price for the identifier held in `cell`, if any.
    pub fn lookup(&self, cell: Option<&CellValue>) -> Option<f64> {
        let id = Identifier::from_cell(cell?)?;
        self.get(&id)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Identifier, f64> {
        self.prices.iter()
    }
}

impl FromIterator<(Identifier, f64)> for PriceMap {
    fn from_iter<T: IntoIterator<Item = (Identifier, f64)>>(iter: T) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Inclusion rule shared by every price source: both cells present, the price
/// numeric and not zero. Zero marks a price that has not been entered yet.
pub(crate) fn priced_entry(
    id_cell: Option<&CellValue>,
    price_cell: Option<&CellValue>,
) -> Option<(Identifier, f64)> {
    let id = Identifier::from_cell(id_cell?)?;
    let price_cell = price_cell.filter(|v| !v.is_blank())?;
    match price_cell.as_number() {
        Ok(price) if price != 0.0 => Some((id, price)),
        Ok(_) => None,
        Err(err) => {
            debug!(id = id.as_str(), %err, "price is not numeric, leaving it out");
            None
        }
    }
}

/// Reads one identifier/price pair per column in `[start_column, end_column)`.
pub fn build<G: Grid + ?Sized>(
    sheet: &G,
    id_row: u32,
    price_row: u32,
    start_column: u32,
    end_column: u32,
) -> PriceMap {
    let mut map = PriceMap::new();
    for column in start_column..end_column {
        if let Some((id, price)) =
            priced_entry(sheet.cell(id_row, column), sheet.cell(price_row, column))
        {
            map.insert(id, price);
        }
    }
    debug!(start_column, end_column, entries = map.len(), "built price map from block");
    map
}

/// Row-oriented price list: identifiers and prices in two fixed columns from
/// `first_row` down.
pub fn build_flat<G: Grid + ?Sized>(
    sheet: &G,
    id_column: u32,
    price_column: u32,
    first_row: u32,
) -> PriceMap {
    let mut map = PriceMap::new();
    for row in first_row..=sheet.max_row() {
        if let Some((id, price)) =
            priced_entry(sheet.cell(row, id_column), sheet.cell(row, price_column))
        {
            map.insert(id, price);
        }
    }
    debug!(first_row, entries = map.len(), "built price map from list");
    map
}

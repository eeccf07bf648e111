//! Profit and profit rate per sales row, priced from the stock ledger.

use tracing::{debug, warn};

use crate::{
    CellValue, Grid,
    config::PositionConfig,
    error::DataConversionError,
    price_map::{Identifier, PriceMap, priced_entry},
    progress::{Progress, Stage, Ticker},
};

/// Sales-ledger columns read and written by [`apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesColumns {
    pub id: u32,
    pub amount: u32,
    pub quantity: u32,
    pub profit: u32,
    pub profit_rate: u32,
}

impl From<&PositionConfig> for SalesColumns {
    fn from(p: &PositionConfig) -> Self {
        Self {
            id: p.sales_id_column,
            amount: p.sales_amount_column,
            quantity: p.sales_quantity_column,
            profit: p.sales_profit_column,
            profit_rate: p.sales_profit_rate_column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitLine {
    pub profit: f64,
    pub profit_rate: f64,
}

/// `None` when amount or quantity is zero; that also keeps the rate's
/// divisor away from zero.
pub fn profit_line(amount: f64, quantity: f64, unit_price: f64) -> Option<ProfitLine> {
    if amount == 0.0 || quantity == 0.0 {
        return None;
    }
    let profit = amount - quantity * unit_price;
    Some(ProfitLine {
        profit,
        profit_rate: profit / amount,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfitTally {
    pub updated: usize,
    /// Matched rows rejected for a non-numeric or zero amount/quantity.
    pub skipped: usize,
}

/// Unit prices as recorded in the stock ledger from `data_start_row` down.
pub fn stock_prices<G: Grid + ?Sized>(
    stock: &G,
    id_column: u32,
    price_column: u32,
    data_start_row: u32,
) -> PriceMap {
    let mut map = PriceMap::new();
    for row in data_start_row..=stock.max_row() {
        if let Some((id, price)) =
            priced_entry(stock.cell(row, id_column), stock.cell(row, price_column))
        {
            map.insert(id, price);
        }
    }
    debug!(data_start_row, entries = map.len(), "read unit prices from stock ledger");
    map
}

enum RowOutcome {
    Unmatched,
    Incomplete,
    Rejected,
    Priced(ProfitLine),
}

fn evaluate_row<G: Grid + ?Sized>(
    sales: &G,
    row: u32,
    prices: &PriceMap,
    columns: SalesColumns,
) -> RowOutcome {
    let Some(id) = sales.cell(row, columns.id).and_then(Identifier::from_cell) else {
        return RowOutcome::Unmatched;
    };
    let Some(unit_price) = prices.get(&id) else {
        return RowOutcome::Unmatched;
    };
    let (Some(amount), Some(quantity)) = (
        sales.cell(row, columns.amount).filter(|v| !v.is_blank()),
        sales.cell(row, columns.quantity).filter(|v| !v.is_blank()),
    ) else {
        return RowOutcome::Incomplete;
    };
    let numbers: Result<(f64, f64), DataConversionError> =
        amount.as_number().and_then(|a| Ok((a, quantity.as_number()?)));
    match numbers {
        Ok((amount, quantity)) => match profit_line(amount, quantity, unit_price) {
            Some(line) => RowOutcome::Priced(line),
            None => {
                warn!(row, id = id.as_str(), amount, quantity, "zero amount or quantity, row skipped");
                RowOutcome::Rejected
            }
        },
        Err(err) => {
            warn!(row, id = id.as_str(), %err, "sales row skipped");
            RowOutcome::Rejected
        }
    }
}

/// Writes profit and profit rate into every sales row whose identifier has a
/// unit price.
pub fn apply<G: Grid + ?Sized>(
    sales: &mut G,
    prices: &PriceMap,
    columns: SalesColumns,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> ProfitTally {
    let total = sales.max_row();
    let mut ticker = Ticker::new(Stage::SalesProfit, total, progress);
    let mut tally = ProfitTally::default();
    for row in 1..=total {
        match evaluate_row(sales, row, prices, columns) {
            RowOutcome::Priced(line) => {
                sales.set_cell(row, columns.profit, CellValue::Number(line.profit));
                sales.set_cell(row, columns.profit_rate, CellValue::Number(line.profit_rate));
                tally.updated += 1;
            }
            RowOutcome::Rejected => tally.skipped += 1,
            RowOutcome::Unmatched | RowOutcome::Incomplete => {}
        }
        ticker.row(row);
    }
    ticker.finish();
    debug!(rows = total, updated = tally.updated, skipped = tally.skipped, "computed profit");
    tally
}

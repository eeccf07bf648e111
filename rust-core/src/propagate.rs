use tracing::debug;

use crate::{
    CellValue, Grid,
    price_map::PriceMap,
    progress::{Progress, Stage, Ticker},
};

/// Writes the mapped price into `price_column` of every row whose
/// `id_column` names a priced item. Returns the number of rows written.
///
/// Rows without a match are left alone, so running it again with the same
/// map gives the same cells and the same count.
pub fn apply<G: Grid + ?Sized>(
    stock: &mut G,
    prices: &PriceMap,
    id_column: u32,
    price_column: u32,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> usize {
    let total = stock.max_row();
    let mut ticker = Ticker::new(Stage::StockPrices, total, progress);
    let mut updated = 0;
    for row in 1..=total {
        if let Some(price) = prices.lookup(stock.cell(row, id_column)) {
            stock.set_cell(row, price_column, CellValue::Number(price));
            updated += 1;
        }
        ticker.row(row);
    }
    ticker.finish();
    debug!(rows = total, updated, "propagated prices");
    updated
}

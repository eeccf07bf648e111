//! Finding one month's block of columns in the price table.
//!
//! The table repeats a block of columns per month with nothing but a header
//! label marking where a block starts. A block ends where the next month's
//! label sits; the latest month has no successor yet, so its end is taken as
//! the first column with nothing in the top `span` rows.

use std::ops::Range;

use tracing::debug;

use crate::{
    Grid,
    error::LedgerError,
    period::{PeriodKey, PeriodToken},
};

/// Rows inspected when looking for an all-blank column.
pub const DEFAULT_SCAN_DEPTH: u32 = 25;

/// First column of `header_row` whose text contains `token`.
pub fn find_token<G: Grid + ?Sized>(sheet: &G, header_row: u32, token: &PeriodToken) -> Option<u32> {
    find_token_from(sheet, header_row, token, 1)
}

/// Like [`find_token`], starting at column `from`.
pub fn find_token_from<G: Grid + ?Sized>(
    sheet: &G,
    header_row: u32,
    token: &PeriodToken,
    from: u32,
) -> Option<u32> {
    (from.max(1)..=sheet.max_column()).find(|&column| {
        sheet
            .cell(header_row, column)
            .is_some_and(|value| value.to_string().contains(token.as_str()))
    })
}

/// First column right of `after` whose rows `1..=span` are all empty.
/// Past the used range every column is empty, so this never fails.
pub fn first_blank_column<G: Grid + ?Sized>(sheet: &G, after: u32, span: u32) -> u32 {
    let last = sheet.max_column();
    (after + 1..=last)
        .find(|&column| (1..=span).all(|row| !sheet.has_value(row, column)))
        .unwrap_or(last + 1)
        .max(after + 1)
}

/// Exclusive end of the block starting at `start`: the successor's column
/// when it appears to the right, else the first blank column.
pub fn find_block_end<G: Grid + ?Sized>(
    sheet: &G,
    header_row: u32,
    start: u32,
    successor: &PeriodToken,
    span: u32,
) -> u32 {
    match find_token_from(sheet, header_row, successor, start + 1) {
        Some(column) => column,
        None => {
            let end = first_blank_column(sheet, start, span);
            debug!(%successor, start, end, "no successor header, block ends at first blank column");
            end
        }
    }
}

/// Column range `[start, end)` holding `period`'s block.
pub fn locate_block<G: Grid + ?Sized>(
    sheet: &G,
    header_row: u32,
    period: &PeriodKey,
    span: u32,
) -> Result<Range<u32>, LedgerError> {
    let token = period.token();
    let start = find_token(sheet, header_row, &token)
        .ok_or_else(|| LedgerError::PeriodNotFound { token: token.clone() })?;
    let end = match period.successor() {
        Some(successor) => find_block_end(sheet, header_row, start, &successor, span),
        None => first_blank_column(sheet, start, span),
    };
    debug!(%token, start, end, "located price block");
    Ok(start..end)
}

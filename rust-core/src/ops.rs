//! The two top-level operations: load the workbooks named in the
//! configuration, run the core over them and save the one that changed.
//!
//! `propagate_prices` and `apply_sales_profit` hold the logic over workbooks
//! already in memory; `update_stock_prices` and `compute_sales_profit` wrap
//! them with file access.

use std::path::Path;

use tracing::{debug, info};

use crate::{
    Sheet, Workbook,
    config::{LedgerConfig, PriceLayout},
    error::LedgerError,
    locate::locate_block,
    period::{PeriodKey, PeriodToken},
    persist, price_map,
    price_map::PriceMap,
    profit::{self, SalesColumns},
    progress::Progress,
    propagate,
    resolve::resolve_sheet,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute and report, but leave the target file untouched.
    pub dry_run: bool,
}

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub period: PeriodToken,
    /// Sheet that received the writes.
    pub sheet: String,
    pub updated: usize,
    pub skipped: usize,
    /// `false` for dry runs and runs that changed nothing.
    pub saved: bool,
}

fn source_index(book: &Workbook, name: Option<&str>) -> Option<usize> {
    match name {
        Some(name) => book.sheet_names().position(|n| n == name),
        None => (!book.is_empty()).then(|| book.active_index()),
    }
}

fn missing_sheet(book: &Workbook, name: Option<&str>) -> LedgerError {
    LedgerError::SourceSheetMissing {
        name: name.unwrap_or("(active sheet)").to_owned(),
        path: book.source_path().map(Path::to_path_buf).unwrap_or_default(),
    }
}

/// The configured tab, or the active one when none is configured.
fn source_sheet<'a>(book: &'a Workbook, name: Option<&str>) -> Result<&'a Sheet, LedgerError> {
    source_index(book, name)
        .and_then(|i| book.sheet_at(i))
        .ok_or_else(|| missing_sheet(book, name))
}

fn source_sheet_mut<'a>(
    book: &'a mut Workbook,
    name: Option<&str>,
) -> Result<&'a mut Sheet, LedgerError> {
    let missing = missing_sheet(book, name);
    source_index(book, name)
        .and_then(|i| book.sheet_at_mut(i))
        .ok_or(missing)
}

fn period_sheet<'a>(book: &'a Workbook, token: &PeriodToken) -> Result<&'a Sheet, LedgerError> {
    resolve_sheet(book, token)
        .and_then(|i| book.sheet_at(i))
        .ok_or_else(|| LedgerError::SheetNotFound {
            token: token.clone(),
        })
}

/// Unit prices for `period` read from the price table.
pub fn read_price_map(
    price_book: &Workbook,
    config: &LedgerConfig,
    period: &PeriodKey,
) -> Result<PriceMap, LedgerError> {
    let p = &config.positions;
    let sheet = source_sheet(price_book, config.price_sheet.as_deref())?;
    let prices = match config.price_layout {
        PriceLayout::Monthly => {
            let block = locate_block(sheet, p.price_header_row, period, p.block_scan_depth)?;
            price_map::build(sheet, p.price_id_row, p.price_row, block.start, block.end)
        }
        PriceLayout::Flat => {
            price_map::build_flat(sheet, p.flat_id_column, p.flat_price_column, p.flat_first_row)
        }
    };
    debug!(sheet = sheet.name(), entries = prices.len(), "read price table");
    Ok(prices)
}

/// Writes `period`'s prices into the stock sheet named for it.
///
/// Nothing in `stock_book` is touched unless both the price block and the
/// stock sheet are found.
pub fn propagate_prices(
    price_book: &Workbook,
    stock_book: &mut Workbook,
    config: &LedgerConfig,
    period: &PeriodKey,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> Result<UpdateReport, LedgerError> {
    config.validate()?;
    let p = &config.positions;
    let prices = read_price_map(price_book, config, period)?;

    let token = period.token();
    let missing = LedgerError::SheetNotFound {
        token: token.clone(),
    };
    let stock = resolve_sheet(stock_book, &token)
        .and_then(|i| stock_book.sheet_at_mut(i))
        .ok_or(missing)?;
    let updated = propagate::apply(stock, &prices, p.stock_id_column, p.stock_price_column, progress);
    info!(%token, sheet = stock.name(), prices = prices.len(), updated, "transcribed unit prices");

    Ok(UpdateReport {
        period: token,
        sheet: stock.name().to_owned(),
        updated,
        skipped: 0,
        saved: false,
    })
}

/// Prices every sales row from the stock sheet named for `period`.
pub fn apply_sales_profit(
    stock_book: &Workbook,
    sales_book: &mut Workbook,
    config: &LedgerConfig,
    period: &PeriodKey,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> Result<UpdateReport, LedgerError> {
    config.validate()?;
    let p = &config.positions;
    let token = period.token();
    let stock = period_sheet(stock_book, &token)?;
    let prices = profit::stock_prices(
        stock,
        p.stock_id_column,
        p.stock_price_column,
        p.stock_data_start_row,
    );

    let sales = source_sheet_mut(sales_book, config.sales_sheet.as_deref())?;
    let tally = profit::apply(sales, &prices, SalesColumns::from(p), progress);
    info!(
        %token,
        stock_sheet = stock.name(),
        sheet = sales.name(),
        updated = tally.updated,
        skipped = tally.skipped,
        "computed sales profit"
    );

    Ok(UpdateReport {
        period: token,
        sheet: sales.name().to_owned(),
        updated: tally.updated,
        skipped: tally.skipped,
        saved: false,
    })
}

fn open(path: &Path) -> Result<Workbook, LedgerError> {
    Workbook::open(path).map_err(|err| LedgerError::io("open", path, err))
}

/// Saves `book` over `path` unless this is a dry run or nothing was written.
fn commit(book: &Workbook, path: &Path, options: RunOptions) -> Result<bool, LedgerError> {
    if options.dry_run {
        info!(path = %path.display(), "dry run, file left unchanged");
        return Ok(false);
    }
    if !book.is_dirty() {
        debug!(path = %path.display(), "no cells written, skipping save");
        return Ok(false);
    }
    persist::save(book, path)?;
    Ok(true)
}

/// Transcribes `period`'s unit prices from the price table into the stock
/// ledger and saves the stock ledger.
pub fn update_stock_prices(
    config: &LedgerConfig,
    period: &PeriodKey,
    options: RunOptions,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> Result<UpdateReport, LedgerError> {
    config.validate()?;
    info!(
        %period,
        price_file = %config.price_file.display(),
        stock_file = %config.stock_file.display(),
        "updating stock ledger prices"
    );
    let price_book = open(&config.price_file)?;
    let mut stock_book = open(&config.stock_file)?;
    let mut report = propagate_prices(&price_book, &mut stock_book, config, period, progress)?;
    report.saved = commit(&stock_book, &config.stock_file, options)?;
    Ok(report)
}

/// Computes profit and profit rate in the sales ledger from the stock
/// ledger's `period` sheet and saves the sales ledger.
pub fn compute_sales_profit(
    config: &LedgerConfig,
    period: &PeriodKey,
    options: RunOptions,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> Result<UpdateReport, LedgerError> {
    config.validate()?;
    info!(
        %period,
        stock_file = %config.stock_file.display(),
        sales_file = %config.sales_file.display(),
        "computing sales profit"
    );
    let stock_book = open(&config.stock_file)?;
    let mut sales_book = open(&config.sales_file)?;
    let mut report = apply_sales_profit(&stock_book, &mut sales_book, config, period, progress)?;
    report.saved = commit(&sales_book, &config.sales_file, options)?;
    Ok(report)
}

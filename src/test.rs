#[cfg(test)]
use crate::{
    cli::{Cli, Command, ConfigCommand},
    load_config, summary,
};
#[cfg(test)]
use clap::{CommandFactory, Parser};
#[cfg(test)]
use ledger_core::{LedgerConfig, PeriodKey, Stage, ops::UpdateReport};
#[cfg(test)]
use std::path::Path;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parses_stock_run() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from([
        "ledger-sync", "stock", "--year", "2025", "--month", "1", "--dry-run",
    ])?;
    assert_eq!(cli.config, Path::new("ledger-sync.json"));
    assert_eq!(cli.verbose, 0);
    match cli.command {
        Command::Stock(args) => assert_eq!((args.year, args.month, args.dry_run), (2025, 1, true)),
        other => panic!("unexpected command {other:?}"),
    }
    Ok(())
}

#[test]
fn global_flags_follow_the_subcommand() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from([
        "ledger-sync", "profit", "--year", "2025", "--month", "12", "--sales-file", "s.xlsx",
        "--config", "other.json", "-vv",
    ])?;
    assert_eq!(cli.sales_file.as_deref(), Some(Path::new("s.xlsx")));
    assert_eq!(cli.config, Path::new("other.json"));
    assert_eq!(cli.verbose, 2);
    assert!(matches!(cli.command, Command::Profit(ref args) if !args.dry_run));
    Ok(())
}

#[test]
fn rejects_out_of_range_periods() {
    let month_13 = ["ledger-sync", "stock", "--year", "2025", "--month", "13"];
    assert!(Cli::try_parse_from(month_13).is_err());
    let short_year = ["ledger-sync", "stock", "--year", "25", "--month", "1"];
    assert!(Cli::try_parse_from(short_year).is_err());
    let no_month = ["ledger-sync", "profit", "--year", "2025"];
    assert!(Cli::try_parse_from(no_month).is_err());
}

#[test]
fn parses_config_and_sheets_commands() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from(["ledger-sync", "config", "set", "stock_price_column", "12"])?;
    match cli.command {
        Command::Config(ConfigCommand::Set { key, value }) => {
            assert_eq!((key.as_str(), value.as_str()), ("stock_price_column", "12"));
        }
        other => panic!("unexpected command {other:?}"),
    }
    let cli = Cli::try_parse_from(["ledger-sync", "sheets", "book.xlsx"])?;
    assert!(matches!(cli.command, Command::Sheets { ref file } if file == Path::new("book.xlsx")));
    Ok(())
}

#[test]
fn file_overrides_apply_over_the_document() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger-sync.json");
    let mut stored = LedgerConfig::default();
    stored.set_value("sales_file", "stored_sales.xlsx")?;
    stored.save(&path)?;

    let config_arg = path.to_string_lossy().into_owned();
    let cli = Cli::try_parse_from([
        "ledger-sync", "--config", config_arg.as_str(), "--price-file", "p.xlsx", "config", "show",
    ])?;
    let config = load_config(&cli)?;
    assert_eq!(config.price_file, Path::new("p.xlsx"));
    assert_eq!(config.sales_file, Path::new("stored_sales.xlsx"));
    assert_eq!(config.stock_file, LedgerConfig::default().stock_file);
    Ok(())
}

#[test]
fn summary_line() -> anyhow::Result<()> {
    let report = UpdateReport {
        period: PeriodKey::new(2025, 1)?.token(),
        sheet: "sales".to_owned(),
        updated: 3,
        skipped: 1,
        saved: false,
    };
    assert_eq!(
        summary(Stage::SalesProfit, &report),
        "202501: computed profit for 3 rows in sheet 'sales', 1 rows skipped (not saved)"
    );
    let saved = UpdateReport {
        skipped: 0,
        saved: true,
        ..report
    };
    assert_eq!(
        summary(Stage::StockPrices, &saved),
        "202501: updated unit prices of 3 items in sheet 'sales'"
    );
    Ok(())
}

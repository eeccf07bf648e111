use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ledger-sync",
    version,
    about = "Transcribe monthly unit prices into the stock ledger and compute sales profit"
)]
pub struct Cli {
    /// Configuration document (JSON); defaults apply when it does not exist
    #[arg(long, global = true, default_value = "ledger-sync.json")]
    pub config: PathBuf,

    /// Price table workbook, overriding the configuration for this run
    #[arg(long, global = true)]
    pub price_file: Option<PathBuf>,

    /// Stock ledger workbook, overriding the configuration for this run
    #[arg(long, global = true)]
    pub stock_file: Option<PathBuf>,

    /// Sales ledger workbook, overriding the configuration for this run
    #[arg(long, global = true)]
    pub sales_file: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the month's unit prices from the price table into the stock ledger
    Stock(RunArgs),
    /// Compute profit and profit rate in the sales ledger from the stock ledger
    Profit(RunArgs),
    /// List the sheets of a workbook; the active one is marked with '*'
    Sheets { file: PathBuf },
    /// Show or edit the configuration document
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, value_parser = clap::value_parser!(i32).range(1000..=9999))]
    pub year: i32,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,

    /// Report what would change without saving
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Overwrite the configuration document with the defaults
    Reset,
    /// Set one key, e.g. `stock_price_column 12` or `price_sheet ""`
    Set { key: String, value: String },
}

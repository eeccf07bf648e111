mod cli;
mod test;

use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use ledger_core::{
    LedgerConfig, PeriodKey, Progress, Stage,
    ops::{self, RunOptions, UpdateReport},
    scan,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand, RunArgs};

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // RUST_LOG wins over -v
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}

/// The configuration document with this run's file overrides applied.
fn load_config(cli: &Cli) -> Result<LedgerConfig> {
    let mut config = LedgerConfig::load(&cli.config)?;
    if let Some(path) = &cli.price_file {
        config.price_file = path.clone();
    }
    if let Some(path) = &cli.stock_file {
        config.stock_file = path.clone();
    }
    if let Some(path) = &cli.sales_file {
        config.sales_file = path.clone();
    }
    Ok(config)
}

fn summary(stage: Stage, report: &UpdateReport) -> String {
    let mut line = match stage {
        Stage::StockPrices => format!(
            "{}: updated unit prices of {} items in sheet '{}'",
            report.period, report.updated, report.sheet
        ),
        Stage::SalesProfit => format!(
            "{}: computed profit for {} rows in sheet '{}'",
            report.period, report.updated, report.sheet
        ),
    };
    if report.skipped > 0 {
        line.push_str(&format!(", {} rows skipped", report.skipped));
    }
    if !report.saved {
        line.push_str(" (not saved)");
    }
    line
}

fn run_operation(cli: &Cli, args: &RunArgs, stage: Stage) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let options = RunOptions {
        dry_run: args.dry_run,
    };
    let mut progress = |p: Progress| debug!(stage = ?p.stage, row = p.row, total = p.total, "progress");
    let outcome = PeriodKey::new(args.year, args.month).and_then(|period| match stage {
        Stage::StockPrices => ops::update_stock_prices(&config, &period, options, Some(&mut progress)),
        Stage::SalesProfit => ops::compute_sales_profit(&config, &period, options, Some(&mut progress)),
    });
    match outcome {
        Ok(report) => {
            println!("{}", summary(stage, &report));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let code = err.exit_code();
            eprintln!("error: {:#}", anyhow::Error::new(err));
            Ok(ExitCode::from(code))
        }
    }
}

fn list_sheets(file: &Path) -> Result<ExitCode> {
    let index = scan(file).with_context(|| format!("cannot read sheets of {}", file.display()))?;
    for (i, name) in index.names.iter().enumerate() {
        let marker = if i == index.active { '*' } else { ' ' };
        println!("{marker} {name}");
    }
    Ok(ExitCode::SUCCESS)
}

fn config_command(path: &Path, command: &ConfigCommand) -> Result<ExitCode> {
    match command {
        ConfigCommand::Show => {
            let config = LedgerConfig::load(path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Reset => {
            LedgerConfig::reset(path)?;
            println!("wrote default configuration to {}", path.display());
        }
        ConfigCommand::Set { key, value } => {
            let mut config = LedgerConfig::load(path)?;
            config.set_value(key, value)?;
            config.save(path)?;
            println!("{key} = {}", value.trim());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Stock(args) => run_operation(cli, args, Stage::StockPrices),
        Command::Profit(args) => run_operation(cli, args, Stage::SalesProfit),
        Command::Sheets { file } => list_sheets(file),
        Command::Config(command) => config_command(&cli.config, command),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(&cli)
}

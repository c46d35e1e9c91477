use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;

use returnlab::{
    AnalyticsReport, CsvPriceSource, CsvReturnStore, EtlSummary, HtmlReportSink, PipelineConfig,
    logging, pipeline,
};

/// Daily return ETL and risk report for a small set of instruments.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive daily returns from the price file and replace the stored set.
    Etl,
    /// Compute analytics over the stored returns and write the HTML report.
    Report,
    /// Run the ETL and the report back to back.
    Run,
}

#[derive(Args)]
struct Overrides {
    /// Tickers to process, e.g. `--tickers NVDA QQQ`.
    #[arg(long, num_args = 1.., global = true)]
    tickers: Option<Vec<String>>,

    /// First date to read (YYYY-MM-DD).
    #[arg(long, global = true)]
    start_date: Option<NaiveDate>,

    /// Date to stop before (YYYY-MM-DD).
    #[arg(long, global = true)]
    end_date: Option<NaiveDate>,

    /// Wide price CSV (`Date,Close_NVDA,...`).
    #[arg(long, global = true)]
    prices: Option<PathBuf>,

    /// Date column header in the price file.
    #[arg(long, global = true)]
    date_column: Option<String>,

    /// Long-form returns CSV used as the store.
    #[arg(long, global = true)]
    returns: Option<PathBuf>,

    /// Output HTML report.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Annualized risk-free rate for the Sharpe ratio.
    #[arg(long, global = true)]
    risk_free_rate: Option<f64>,

    /// Rolling volatility window in observations.
    #[arg(long, global = true)]
    window: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(tickers) = self.tickers {
            config.tickers = tickers;
        }
        if let Some(start) = self.start_date {
            config.start_date = start;
        }
        if let Some(end) = self.end_date {
            config.end_date = end;
        }
        if let Some(prices) = self.prices {
            config.prices_path = prices;
        }
        if let Some(column) = self.date_column {
            config.date_column = column;
        }
        if let Some(returns) = self.returns {
            config.returns_path = returns;
        }
        if let Some(report) = self.report {
            config.report_path = report;
        }
        if let Some(rate) = self.risk_free_rate {
            config.risk_free_rate = rate;
        }
        if let Some(window) = self.window {
            config.rolling_window = window;
        }
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_logging()?;

    let cli = Cli::parse();
    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    let source = CsvPriceSource::new(&config.prices_path).with_date_column(&config.date_column);
    let mut store = CsvReturnStore::new(&config.returns_path);
    let mut sink = HtmlReportSink::new(&config.report_path, config.report_title.clone())
        .with_conclusion(config.conclusion.clone());

    match cli.command {
        Commands::Etl => {
            let summary = pipeline::run_etl(&config, &source, &mut store)?;
            print_summary(&summary);
        }
        Commands::Report => {
            let report = pipeline::run_analysis(&config, &store, &mut sink)?;
            print_risk_table(&report);
            println!("Report written to {}", config.report_path.display());
        }
        Commands::Run => {
            let (summary, report) = pipeline::run(&config, &source, &mut store, &mut sink)?;
            print_summary(&summary);
            print_risk_table(&report);
            println!("Report written to {}", config.report_path.display());
        }
    }

    Ok(())
}

fn print_summary(summary: &EtlSummary) {
    println!(
        "Stored {} daily returns for {}",
        summary.records,
        summary.covered.join(", ")
    );
    let missing = summary.missing();
    if !missing.is_empty() {
        println!("No price column found for: {}", missing.join(", "));
    }
}

fn print_risk_table(report: &AnalyticsReport) {
    let mut table = Table::new();
    table.set_header(vec![
        "Ticker",
        "Observations",
        "Mean",
        "Ann. Volatility",
        "Sharpe",
    ]);
    for (ticker, stats) in &report.stats {
        let volatility = report.volatility.get(ticker).copied().unwrap_or(f64::NAN);
        let sharpe = report.sharpe.get(ticker).copied().unwrap_or(f64::NAN);
        table.add_row(vec![
            ticker.clone(),
            stats.count.to_string(),
            format!("{:.6}", stats.mean),
            format!("{volatility:.4}"),
            format!("{sharpe:.4}"),
        ]);
    }
    println!("{table}");
}

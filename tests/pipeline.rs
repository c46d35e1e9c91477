use std::fs;
use std::io::Write;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use tempfile::{NamedTempFile, TempDir};

use returnlab::{
    AnalyticsReport, CsvPriceSource, CsvReturnStore, HtmlReportSink, MemoryReturnStore,
    PipelineConfig, PipelineError, PriceSource, ReportError, ReportSink, ReturnRecord,
    ReturnStore, StoreError, logging, pipeline,
};

const PRICES: &str = "Date,Close_NVDA,Close_QQQ,Close_NEW,Volume_NVDA
2023-12-28,90,390,,1000
2023-12-29,100,400,,1100
2024-01-02,110,404,,1200
2024-01-03,99,408.04,20,1300
2024-01-04,108.9,412.1204,21,1400
2024-01-05,120,420,22,1500
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn price_file() -> anyhow::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{PRICES}")?;
    Ok(file)
}

fn config(tickers: &[&str]) -> PipelineConfig {
    PipelineConfig {
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        start_date: date(2023, 12, 29),
        end_date: date(2024, 1, 5),
        rolling_window: 2,
        ..PipelineConfig::default()
    }
}

#[derive(Default)]
struct CapturingSink {
    reports: Vec<AnalyticsReport>,
}

impl ReportSink for CapturingSink {
    fn render(&mut self, report: &AnalyticsReport) -> Result<(), ReportError> {
        self.reports.push(report.clone());
        Ok(())
    }
}

#[test]
fn csv_source_filters_to_the_requested_range() -> anyhow::Result<()> {
    let file = price_file()?;
    let source = CsvPriceSource::new(file.path());

    let table = source.fetch(
        &["NVDA".to_string()],
        date(2023, 12, 29),
        date(2024, 1, 5),
    )?;

    assert_eq!(
        table.dates(),
        &[
            date(2023, 12, 29),
            date(2024, 1, 2),
            date(2024, 1, 3),
            date(2024, 1, 4)
        ]
    );
    assert!(table.is_ticker_keyed());
    assert_eq!(table.tickers(), vec!["NVDA", "QQQ", "NEW"]);
    let new = table.column("Close", Some("NEW")).expect("NEW column");
    assert_eq!(new.values(), &[None, None, Some(20.0), Some(21.0)]);

    Ok(())
}

#[test]
fn csv_source_reads_a_renamed_date_column() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{}", PRICES.replacen("Date", "trade_date", 1))?;

    let config = PipelineConfig {
        date_column: "trade_date".to_string(),
        ..config(&["NVDA"])
    };
    let source = CsvPriceSource::new(file.path()).with_date_column(&config.date_column);
    let mut store = MemoryReturnStore::new();

    let summary = pipeline::run_etl(&config, &source, &mut store)?;
    assert_eq!(summary.records, 3);

    let default_source = CsvPriceSource::new(file.path());
    let error = pipeline::run_etl(&config, &default_source, &mut store)
        .expect_err("no `Date` column in the file");
    assert!(matches!(error, PipelineError::Prices(_)));
    assert_eq!(store.rows().len(), 3);

    Ok(())
}

#[test]
fn end_to_end_pipeline_persists_and_reports() -> anyhow::Result<()> {
    logging::init_logging()?;

    let file = price_file()?;
    let dir = TempDir::new()?;
    let returns_path = dir.path().join("store").join("daily_returns.csv");
    let report_path = dir.path().join("report.html");

    let config = config(&["NVDA", "QQQ", "NEW", "MSFT"]);
    let source = CsvPriceSource::new(file.path());
    let mut store = CsvReturnStore::new(&returns_path);
    let mut sink = HtmlReportSink::new(&report_path, "NVDA vs QQQ");

    let (summary, report) = pipeline::run(&config, &source, &mut store, &mut sink)?;

    assert_eq!(summary.records, 7);
    assert_eq!(summary.covered, vec!["NVDA", "QQQ", "NEW"]);
    assert_eq!(summary.missing(), vec!["MSFT"]);

    let stored = store.load()?;
    assert_eq!(stored.len(), 7);
    assert_eq!(stored.by_ticker("NVDA").len(), 3);
    assert_eq!(stored.by_ticker("QQQ").len(), 3);
    let new = stored.by_ticker("NEW");
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].0, date(2024, 1, 4));
    assert_abs_diff_eq!(new[0].1, 0.05, epsilon = 1e-9);

    assert_eq!(report.tickers(), vec!["NEW", "NVDA", "QQQ"]);
    let nvda = &report.cumulative["NVDA"];
    assert_abs_diff_eq!(nvda[2].1, 1.1 * 0.9 * 1.1 - 1.0, epsilon = 1e-9);
    assert!(report.volatility["NEW"].is_nan());
    assert!(report.correlation.get("NEW", "NVDA").unwrap().is_nan());
    assert_eq!(report.correlation.get("NVDA", "NVDA"), Some(1.0));

    let html = fs::read_to_string(&report_path)?;
    assert!(html.contains("<title>NVDA vs QQQ</title>"));
    assert!(html.contains("Plotly.newPlot"));
    assert!(html.contains("cumulative-return"));
    assert!(html.contains("rolling-volatility"));
    assert!(html.contains("<td>QQQ</td>"));
    assert!(html.contains("NaN"));

    Ok(())
}

#[test]
fn missing_input_is_fatal_and_leaves_the_store_alone() -> anyhow::Result<()> {
    let file = price_file()?;
    let source = CsvPriceSource::new(file.path());
    let previous = vec![ReturnRecord::new(date(2020, 1, 2), "OLD", 0.01)];
    let mut store = MemoryReturnStore::new();
    store.replace_all(&previous)?;

    let config = PipelineConfig {
        start_date: date(2030, 1, 1),
        end_date: date(2031, 1, 1),
        ..config(&["NVDA"])
    };
    let error = pipeline::run_etl(&config, &source, &mut store).expect_err("no rows in range");

    assert!(matches!(error, PipelineError::InputMissing { .. }));
    assert_eq!(store.rows(), previous.as_slice());

    Ok(())
}

#[test]
fn zero_transformed_rows_is_a_pipeline_failure() -> anyhow::Result<()> {
    let file = price_file()?;
    let source = CsvPriceSource::new(file.path());
    let previous = vec![ReturnRecord::new(date(2020, 1, 2), "OLD", 0.01)];
    let mut store = MemoryReturnStore::new();
    store.replace_all(&previous)?;

    let error = pipeline::run_etl(&config(&["MSFT"]), &source, &mut store)
        .expect_err("MSFT has no column");

    assert!(matches!(error, PipelineError::NoReturns(_)));
    assert_eq!(store.rows(), previous.as_slice());

    Ok(())
}

#[test]
fn invalid_configuration_is_rejected_before_any_io() {
    let source = CsvPriceSource::new("does-not-exist.csv");
    let mut store = MemoryReturnStore::new();
    let config = PipelineConfig {
        rolling_window: 1,
        ..config(&["NVDA"])
    };

    let error = pipeline::run_etl(&config, &source, &mut store).expect_err("window too small");
    assert!(matches!(error, PipelineError::Config(_)));
}

#[test]
fn each_run_replaces_the_whole_store() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut store = CsvReturnStore::new(dir.path().join("returns.csv"));

    let first = vec![
        ReturnRecord::new(date(2024, 1, 2), "NVDA", 0.01),
        ReturnRecord::new(date(2024, 1, 3), "NVDA", 0.02),
        ReturnRecord::new(date(2024, 1, 3), "QQQ", 0.03),
    ];
    let second = vec![ReturnRecord::new(date(2024, 2, 1), "SPY", -0.01)];

    assert_eq!(store.replace_all(&first)?, 3);
    assert_eq!(store.load()?.len(), 3);

    assert_eq!(store.replace_all(&second)?, 1);
    let loaded = store.load()?;
    assert_eq!(loaded.records(), second.as_slice());
    assert!(!dir.path().join("returns.csv.partial").exists());

    Ok(())
}

#[test]
fn store_enforces_ticker_width() {
    let mut store = MemoryReturnStore::new();
    let result = store.replace_all(&[ReturnRecord::new(
        date(2024, 1, 2),
        "WAYTOOLONGTICKER",
        0.01,
    )]);

    assert!(matches!(result, Err(StoreError::TickerTooLong(_))));
    assert!(store.rows().is_empty());
}

#[test]
fn analysis_of_an_empty_store_is_a_pipeline_failure() {
    let store = MemoryReturnStore::new();
    let mut sink = CapturingSink::default();

    let error = pipeline::run_analysis(&PipelineConfig::default(), &store, &mut sink)
        .expect_err("nothing stored");

    assert!(matches!(error, PipelineError::EmptyDataset));
    assert!(sink.reports.is_empty());
}

#[test]
fn analysis_hands_every_result_to_the_sink() -> anyhow::Result<()> {
    let mut store = MemoryReturnStore::new();
    store.replace_all(&[
        ReturnRecord::new(date(2024, 1, 2), "NVDA", 0.01),
        ReturnRecord::new(date(2024, 1, 3), "NVDA", 0.03),
        ReturnRecord::new(date(2024, 1, 4), "NVDA", -0.02),
        ReturnRecord::new(date(2024, 1, 2), "QQQ", 0.02),
        ReturnRecord::new(date(2024, 1, 3), "QQQ", 0.01),
        ReturnRecord::new(date(2024, 1, 4), "QQQ", -0.01),
    ])?;

    let config = PipelineConfig {
        risk_free_rate: 0.05,
        ..config(&["NVDA", "QQQ"])
    };
    let mut sink = CapturingSink::default();
    let report = pipeline::run_analysis(&config, &store, &mut sink)?;

    assert_eq!(sink.reports.len(), 1);
    assert_eq!(sink.reports[0], report);
    assert_eq!(report.risk_free_rate, 0.05);
    assert_eq!(report.rolling["QQQ"].len(), 3);
    assert!(report.rolling["QQQ"][0].1.is_none());

    Ok(())
}

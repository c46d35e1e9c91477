//! Run orchestration: prices -> returns -> store, and store -> analytics -> report.

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::dataset::{DatasetError, ReturnDataset};
use crate::logging::log_event;
use crate::metrics::AnalyticsReport;
use crate::prices::{PriceError, PriceSource};
use crate::report::{ReportError, ReportSink};
use crate::store::{ReturnStore, StoreError};
use crate::transform::ReturnTransformer;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no price data for {tickers:?} between {start} and {end}")]
    InputMissing {
        tickers: Vec<String>,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("price data produced no daily returns for {0:?}; nothing to persist")]
    NoReturns(Vec<String>),
    #[error("stored return dataset is empty")]
    EmptyDataset,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Prices(#[from] PriceError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq)]
pub struct EtlSummary {
    pub requested: Vec<String>,
    /// Requested tickers that produced at least one return.
    pub covered: Vec<String>,
    pub records: usize,
}

impl EtlSummary {
    pub fn missing(&self) -> Vec<&str> {
        self.requested
            .iter()
            .filter(|t| !self.covered.contains(t))
            .map(String::as_str)
            .collect()
    }
}

pub fn run_etl<S, R>(config: &PipelineConfig, source: &S, store: &mut R) -> PipelineResult<EtlSummary>
where
    S: PriceSource + ?Sized,
    R: ReturnStore + ?Sized,
{
    config.validate()?;

    let prices = source.fetch(&config.tickers, config.start_date, config.end_date)?;
    if prices.is_empty() {
        let error = PipelineError::InputMissing {
            tickers: config.tickers.clone(),
            start: config.start_date,
            end: config.end_date,
        };
        log_event(
            file!(),
            "Pipeline",
            "run_etl",
            "pipeline.extract",
            line!(),
            "Price source returned no rows",
            Some(&error.to_string()),
        );
        return Err(error);
    }

    let transformer = ReturnTransformer::with_field(&config.price_field);
    let records = transformer.transform(&prices, &config.tickers);
    if records.is_empty() {
        let error = PipelineError::NoReturns(config.tickers.clone());
        log_event(
            file!(),
            "Pipeline",
            "run_etl",
            "pipeline.transform",
            line!(),
            "Transform produced no records; store left untouched",
            Some(&error.to_string()),
        );
        return Err(error);
    }

    let dataset = ReturnDataset::new(records)?;
    let written = store.replace_all(dataset.records())?;

    let present = dataset.tickers();
    let summary = EtlSummary {
        requested: config.tickers.clone(),
        covered: config
            .tickers
            .iter()
            .filter(|t| present.contains(*t))
            .cloned()
            .collect(),
        records: written,
    };

    log_event(
        file!(),
        "Pipeline",
        "run_etl",
        "pipeline.load",
        line!(),
        &format!(
            "Persisted {} records for {} of {} tickers",
            summary.records,
            summary.covered.len(),
            summary.requested.len()
        ),
        None,
    );

    Ok(summary)
}

pub fn run_analysis<R, K>(
    config: &PipelineConfig,
    store: &R,
    sink: &mut K,
) -> PipelineResult<AnalyticsReport>
where
    R: ReturnStore + ?Sized,
    K: ReportSink + ?Sized,
{
    config.validate()?;

    let dataset = store.load()?;
    if dataset.is_empty() {
        log_event(
            file!(),
            "Pipeline",
            "run_analysis",
            "pipeline.analyze",
            line!(),
            "Refusing to analyze an empty dataset",
            Some("empty dataset"),
        );
        return Err(PipelineError::EmptyDataset);
    }

    let report = AnalyticsReport::compute(&dataset, config.risk_free_rate, config.rolling_window);
    sink.render(&report)?;

    log_event(
        file!(),
        "Pipeline",
        "run_analysis",
        "pipeline.report",
        line!(),
        &format!("Analyzed {} records across {} tickers", dataset.len(), report.tickers().len()),
        None,
    );

    Ok(report)
}

/// ETL followed by analysis over the freshly stored run.
pub fn run<S, R, K>(
    config: &PipelineConfig,
    source: &S,
    store: &mut R,
    sink: &mut K,
) -> PipelineResult<(EtlSummary, AnalyticsReport)>
where
    S: PriceSource + ?Sized,
    R: ReturnStore + ?Sized,
    K: ReportSink + ?Sized,
{
    let summary = run_etl(config, source, store)?;
    let report = run_analysis(config, &*store, sink)?;
    Ok((summary, report))
}

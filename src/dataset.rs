use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::logging::log_event;
use crate::prices::{PriceError, date_to_epoch_days, series_to_dates};
use crate::transform::ReturnRecord;

pub const DATE_COLUMN: &str = "date";
pub const TICKER_COLUMN: &str = "ticker";
pub const RETURN_COLUMN: &str = "daily_return";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("duplicate return for {ticker} on {date}")]
    DuplicateObservation { date: NaiveDate, ticker: String },
    #[error("return frame is missing column `{0}`")]
    MissingColumn(String),
    #[error("failed to convert return frame: {source}")]
    Frame { source: PolarsError },
    #[error(transparent)]
    Date(#[from] PriceError),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Sparse wide view: date -> ticker -> daily return. Absent cells are absent, never zero.
pub type ReturnPivot = BTreeMap<NaiveDate, BTreeMap<String, f64>>;

/// Long-form daily returns shared by the analytics functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnDataset {
    records: Vec<ReturnRecord>,
}

impl ReturnDataset {
    pub fn new(records: Vec<ReturnRecord>) -> DatasetResult<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert((record.date, record.ticker.as_str())) {
                return Err(DatasetError::DuplicateObservation {
                    date: record.date,
                    ticker: record.ticker.clone(),
                });
            }
        }

        log_event(
            file!(),
            "ReturnDataset",
            "new",
            "dataset.build",
            line!(),
            &format!("Built dataset with {} return records", records.len()),
            None,
        );

        Ok(Self { records })
    }

    /// Re-flatten a pivot into long form, one record per defined cell.
    pub fn from_pivot(pivot: &ReturnPivot) -> Self {
        let records = pivot
            .iter()
            .flat_map(|(date, row)| {
                row.iter()
                    .map(move |(ticker, value)| ReturnRecord::new(*date, ticker.as_str(), *value))
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[ReturnRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tickers(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.ticker.clone()).collect()
    }

    /// The ticker's `(date, daily_return)` observations sorted by date.
    pub fn by_ticker(&self, ticker: &str) -> Vec<(NaiveDate, f64)> {
        let mut series: Vec<(NaiveDate, f64)> = self
            .records
            .iter()
            .filter(|r| r.ticker == ticker)
            .map(|r| (r.date, r.daily_return))
            .collect();
        series.sort_by_key(|(date, _)| *date);
        series
    }

    pub fn returns_for(&self, ticker: &str) -> Vec<f64> {
        self.by_ticker(ticker).into_iter().map(|(_, r)| r).collect()
    }

    pub fn pivot(&self) -> ReturnPivot {
        let mut pivot = ReturnPivot::new();
        for record in &self.records {
            pivot
                .entry(record.date)
                .or_default()
                .insert(record.ticker.clone(), record.daily_return);
        }
        pivot
    }

    /// Long frame with `date`, `ticker` and `daily_return` columns, in record order.
    pub fn to_frame(&self) -> DatasetResult<DataFrame> {
        let days: Vec<i32> = self
            .records
            .iter()
            .map(|r| date_to_epoch_days(r.date))
            .collect();
        let tickers: Vec<&str> = self.records.iter().map(|r| r.ticker.as_str()).collect();
        let returns: Vec<f64> = self.records.iter().map(|r| r.daily_return).collect();

        let dates = Series::new(DATE_COLUMN, days)
            .cast(&DataType::Date)
            .map_err(|source| DatasetError::Frame { source })?;

        DataFrame::new(vec![
            dates,
            Series::new(TICKER_COLUMN, tickers),
            Series::new(RETURN_COLUMN, returns),
        ])
        .map_err(|source| DatasetError::Frame { source })
    }

    /// Read a long frame back; rows with a null return are undefined and skipped.
    pub fn from_frame(frame: &DataFrame) -> DatasetResult<Self> {
        let column = |name: &str| {
            frame
                .column(name)
                .map_err(|_| DatasetError::MissingColumn(name.to_string()))
        };

        let dates = series_to_dates(column(DATE_COLUMN)?)?;
        let tickers = column(TICKER_COLUMN)?
            .cast(&DataType::Utf8)
            .map_err(|source| DatasetError::Frame { source })?;
        let tickers = tickers
            .utf8()
            .map_err(|source| DatasetError::Frame { source })?;
        let returns = column(RETURN_COLUMN)?
            .cast(&DataType::Float64)
            .map_err(|source| DatasetError::Frame { source })?;
        let returns = returns
            .f64()
            .map_err(|source| DatasetError::Frame { source })?;

        let mut records = Vec::with_capacity(frame.height());
        let mut skipped = 0usize;
        for ((date, ticker), value) in dates.into_iter().zip(tickers).zip(returns) {
            match (ticker, value) {
                (Some(ticker), Some(value)) => {
                    records.push(ReturnRecord::new(date, ticker, value));
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            log_event(
                file!(),
                "ReturnDataset",
                "from_frame",
                "dataset.build",
                line!(),
                &format!("Skipped {skipped} rows without a ticker or return"),
                None,
            );
        }

        Self::new(records)
    }
}

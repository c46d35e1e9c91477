//! Wide price tables and the CSV-backed price source feeding them.

use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use polars::lazy::dsl::{col, lit};
use polars::prelude::*;
use thiserror::Error;

use crate::config::DEFAULT_DATE_COLUMN;
use crate::logging::log_event;

/// Separates the field from the ticker in wide column headers, e.g. `Close_NVDA`.
pub const COLUMN_SEPARATOR: char = '_';

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("failed to load price data: {source}")]
    Load { source: PolarsError },
    #[error("failed to transform price data: {source}")]
    Transform { source: PolarsError },
    #[error("price table has no `{0}` date column")]
    MissingDateColumn(String),
    #[error("unparseable date `{0}` in price table")]
    InvalidDate(String),
    #[error("price table dates must be strictly ascending: {previous} is followed by {next}")]
    UnorderedDates { previous: NaiveDate, next: NaiveDate },
    #[error("column `{column}` has {found} values but the date axis has {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },
}

pub type PriceResult<T> = Result<T, PriceError>;

/// One price field for one instrument, aligned to the owning table's date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceColumn {
    field: String,
    ticker: Option<String>,
    values: Vec<Option<f64>>,
}

impl PriceColumn {
    pub fn new(field: impl Into<String>, ticker: Option<&str>, values: Vec<Option<f64>>) -> Self {
        Self {
            field: field.into(),
            ticker: ticker.map(str::to_string),
            values,
        }
    }

    /// Parse a wide header: `Close_NVDA` is keyed by ticker, a bare `Close` is not.
    pub fn from_header(header: &str, values: Vec<Option<f64>>) -> Self {
        match header.split_once(COLUMN_SEPARATOR) {
            Some((field, ticker)) if !field.is_empty() && !ticker.is_empty() => {
                Self::new(field, Some(ticker), values)
            }
            _ => Self::new(header, None, values),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn ticker(&self) -> Option<&str> {
        self.ticker.as_deref()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn header(&self) -> String {
        match &self.ticker {
            Some(ticker) => format!("{}{COLUMN_SEPARATOR}{ticker}", self.field),
            None => self.field.clone(),
        }
    }
}

/// Raw prices in wide form: one row per date, one column per field and instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: Vec<PriceColumn>,
}

impl PriceTable {
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<PriceColumn>) -> PriceResult<Self> {
        if let Some(pair) = dates.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(PriceError::UnorderedDates {
                previous: pair[0],
                next: pair[1],
            });
        }

        if let Some(column) = columns.iter().find(|c| c.values.len() != dates.len()) {
            return Err(PriceError::ColumnLength {
                column: column.header(),
                expected: dates.len(),
                found: column.values.len(),
            });
        }

        Ok(Self { dates, columns })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[PriceColumn] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Whether any column carries an instrument dimension.
    pub fn is_ticker_keyed(&self) -> bool {
        self.columns.iter().any(|c| c.ticker.is_some())
    }

    pub fn column(&self, field: &str, ticker: Option<&str>) -> Option<&PriceColumn> {
        self.columns
            .iter()
            .find(|c| c.field == field && c.ticker.as_deref() == ticker)
    }

    /// Instruments present in the table, in column order, without repeats.
    pub fn tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = Vec::new();
        for ticker in self.columns.iter().filter_map(|c| c.ticker.as_deref()) {
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }
        tickers
    }

    /// Build a table from a frame holding a date column plus numeric price columns.
    /// Non-numeric columns other than the date axis are ignored.
    pub fn from_frame(frame: &DataFrame, date_column: &str) -> PriceResult<Self> {
        let date_series = frame
            .column(date_column)
            .map_err(|_| PriceError::MissingDateColumn(date_column.to_string()))?;
        let dates = series_to_dates(date_series)?;

        let mut columns = Vec::new();
        for series in frame.get_columns() {
            if series.name() == date_column || !series.dtype().is_numeric() {
                continue;
            }
            let values = series_to_prices(series)?;
            columns.push(PriceColumn::from_header(series.name(), values));
        }

        Self::new(dates, columns)
    }
}

/// Delivers raw prices for a set of instruments over `[start, end)`.
pub trait PriceSource {
    fn fetch(&self, tickers: &[String], start: NaiveDate, end: NaiveDate)
    -> PriceResult<PriceTable>;
}

/// Reads a wide CSV export (`Date,Close_NVDA,Close_QQQ,...`).
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    path: PathBuf,
    date_column: String,
}

impl CsvPriceSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            date_column: DEFAULT_DATE_COLUMN.to_string(),
        }
    }

    pub fn with_date_column(mut self, column: &str) -> Self {
        self.date_column = column.to_string();
        self
    }

    fn scan(&self) -> PriceResult<LazyFrame> {
        LazyCsvReader::new(&self.path)
            .has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(2048))
            .finish()
            .map_err(|source| {
                log_event(
                    file!(),
                    "CsvPriceSource",
                    "scan",
                    "prices.load",
                    line!(),
                    &format!("Failed to load {}", self.path.display()),
                    Some(&source.to_string()),
                );
                PriceError::Load { source }
            })
    }
}

impl PriceSource for CsvPriceSource {
    fn fetch(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<PriceTable> {
        let date = col(&self.date_column).cast(DataType::Date);
        let in_range = date
            .clone()
            .gt_eq(lit(start))
            .and(date.lt(lit(end)))
            .and(col(&self.date_column).is_not_null());

        let frame = self
            .scan()?
            .filter(in_range)
            .sort(&self.date_column, Default::default())
            .collect()
            .map_err(|source| PriceError::Transform { source })?;

        let table = PriceTable::from_frame(&frame, &self.date_column)?;

        log_event(
            file!(),
            "CsvPriceSource",
            "fetch",
            "prices.filter",
            line!(),
            &format!(
                "Loaded {} dates between {start} and {end} from {} (requested: {})",
                table.dates().len(),
                self.path.display(),
                tickers.join(", ")
            ),
            None,
        );

        Ok(table)
    }
}

fn series_to_prices(series: &Series) -> PriceResult<Vec<Option<f64>>> {
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|source| PriceError::Transform { source })?;
    let chunked = casted
        .f64()
        .map_err(|source| PriceError::Transform { source })?;
    Ok(chunked.into_iter().collect())
}

pub(crate) fn series_to_dates(series: &Series) -> PriceResult<Vec<NaiveDate>> {
    if matches!(series.dtype(), DataType::Utf8) {
        let text = series
            .utf8()
            .map_err(|source| PriceError::Transform { source })?;
        return text
            .into_iter()
            .map(|value| {
                let raw = value.ok_or_else(|| PriceError::InvalidDate("null".to_string()))?;
                parse_date(raw)
            })
            .collect();
    }

    let days = series
        .cast(&DataType::Date)
        .and_then(|dates| dates.cast(&DataType::Int32))
        .map_err(|source| PriceError::Transform { source })?;
    let days = days
        .i32()
        .map_err(|source| PriceError::Transform { source })?;

    days.into_iter()
        .map(|value| {
            let offset = value.ok_or_else(|| PriceError::InvalidDate("null".to_string()))?;
            date_from_epoch_days(offset)
        })
        .collect()
}

pub(crate) fn parse_date(raw: &str) -> PriceResult<NaiveDate> {
    let trimmed = raw.trim();
    let day_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .map_err(|_| PriceError::InvalidDate(raw.to_string()))
}

pub(crate) fn date_from_epoch_days(offset: i32) -> PriceResult<NaiveDate> {
    let epoch = NaiveDate::default();
    let shifted = if offset >= 0 {
        epoch.checked_add_days(Days::new(offset as u64))
    } else {
        epoch.checked_sub_days(Days::new(offset.unsigned_abs() as u64))
    };
    shifted.ok_or_else(|| PriceError::InvalidDate(format!("{offset} days from epoch")))
}

pub(crate) fn date_to_epoch_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

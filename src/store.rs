use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;

use crate::config::MAX_TICKER_LEN;
use crate::dataset::{DatasetError, ReturnDataset};
use crate::logging::log_event;
use crate::transform::ReturnRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticker `{0}` exceeds the {max}-character column width", max = MAX_TICKER_LEN)]
    TickerTooLong(String),
    #[error("return store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("return store serialization failed: {0}")]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable sink for long-form returns. Every write is a full refresh.
pub trait ReturnStore {
    /// Replace the entire contents with `records`, returning the number of rows written.
    fn replace_all(&mut self, records: &[ReturnRecord]) -> StoreResult<usize>;

    fn load(&self) -> StoreResult<ReturnDataset>;
}

fn check_schema(records: &[ReturnRecord]) -> StoreResult<()> {
    match records
        .iter()
        .find(|r| r.ticker.chars().count() > MAX_TICKER_LEN)
    {
        Some(record) => Err(StoreError::TickerTooLong(record.ticker.clone())),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryReturnStore {
    rows: Vec<ReturnRecord>,
}

impl MemoryReturnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ReturnRecord] {
        &self.rows
    }
}

impl ReturnStore for MemoryReturnStore {
    fn replace_all(&mut self, records: &[ReturnRecord]) -> StoreResult<usize> {
        check_schema(records)?;
        self.rows = records.to_vec();
        Ok(self.rows.len())
    }

    fn load(&self) -> StoreResult<ReturnDataset> {
        Ok(ReturnDataset::new(self.rows.clone())?)
    }
}

/// Long-form CSV table with `date,ticker,daily_return` columns.
#[derive(Debug, Clone)]
pub struct CsvReturnStore {
    path: PathBuf,
}

impl CsvReturnStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

impl ReturnStore for CsvReturnStore {
    fn replace_all(&mut self, records: &[ReturnRecord]) -> StoreResult<usize> {
        check_schema(records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut frame = ReturnDataset::new(records.to_vec())?.to_frame()?;
        let staging = self.staging_path();
        {
            let mut file = File::create(&staging)?;
            CsvWriter::new(&mut file).finish(&mut frame)?;
            file.sync_all()?;
        }
        // Rename is the commit point.
        fs::rename(&staging, &self.path).inspect_err(|error| {
            log_event(
                file!(),
                "CsvReturnStore",
                "replace_all",
                "store.replace",
                line!(),
                &format!("Failed to commit {}", self.path.display()),
                Some(&error.to_string()),
            );
        })?;

        log_event(
            file!(),
            "CsvReturnStore",
            "replace_all",
            "store.replace",
            line!(),
            &format!("Replaced {} with {} rows", self.path.display(), records.len()),
            None,
        );

        Ok(records.len())
    }

    fn load(&self) -> StoreResult<ReturnDataset> {
        let frame = LazyCsvReader::new(&self.path)
            .has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(2048))
            .finish()
            .and_then(|lazy| lazy.collect())
            .inspect_err(|error| {
                log_event(
                    file!(),
                    "CsvReturnStore",
                    "load",
                    "store.load",
                    line!(),
                    &format!("Failed to load {}", self.path.display()),
                    Some(&error.to_string()),
                );
            })?;

        let dataset = ReturnDataset::from_frame(&frame)?;

        log_event(
            file!(),
            "CsvReturnStore",
            "load",
            "store.load",
            line!(),
            &format!(
                "Loaded {} rows for {} tickers from {}",
                dataset.len(),
                dataset.tickers().len(),
                self.path.display()
            ),
            None,
        );

        Ok(dataset)
    }
}

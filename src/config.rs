//! Run configuration. A `PipelineConfig` value is threaded explicitly through every
//! pipeline entry point so concurrent runs never share settings.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::log_event;

/// Annualization factor shared by volatility, mean-return scaling and Sharpe.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const DEFAULT_ROLLING_WINDOW: usize = 30;
/// Width of the persisted `ticker` column.
pub const MAX_TICKER_LEN: usize = 10;
pub const DEFAULT_PRICE_FIELD: &str = "Close";
pub const DEFAULT_DATE_COLUMN: &str = "Date";

const ENV_PREFIX: &str = "RETURNLAB";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Instruments to process, in report order.
    pub tickers: Vec<String>,
    /// First date requested from the price source (inclusive).
    pub start_date: NaiveDate,
    /// Last date requested from the price source (exclusive).
    pub end_date: NaiveDate,
    /// Price field the returns are derived from.
    pub price_field: String,
    /// Date axis header in the wide price file.
    pub date_column: String,
    /// Annualized risk-free rate subtracted in the Sharpe ratio.
    pub risk_free_rate: f64,
    /// Trailing observations per rolling-volatility window.
    pub rolling_window: usize,
    pub prices_path: PathBuf,
    pub returns_path: PathBuf,
    pub report_path: PathBuf,
    pub report_title: String,
    /// Free text closing the report, paragraphs separated by blank lines.
    pub conclusion: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tickers: vec!["NVDA".to_string(), "QQQ".to_string()],
            start_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            price_field: DEFAULT_PRICE_FIELD.to_string(),
            date_column: DEFAULT_DATE_COLUMN.to_string(),
            risk_free_rate: 0.0,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            prices_path: PathBuf::from("prices.csv"),
            returns_path: PathBuf::from("daily_returns.csv"),
            report_path: PathBuf::from("returns_report.html"),
            report_title: "Comparative Return Analysis".to_string(),
            conclusion: None,
        }
    }
}

impl PipelineConfig {
    /// Layer defaults, an optional TOML file and `RETURNLAB_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("tickers"),
            )
            .build()?;

        let loaded = settings.try_deserialize::<Self>()?;

        log_event(
            file!(),
            "PipelineConfig",
            "load",
            "config.load",
            line!(),
            &format!(
                "Loaded configuration for {} ticker(s) from {}",
                loaded.tickers.len(),
                path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string())
            ),
            None,
        );

        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tickers.is_empty() {
            return Err(ConfigError::Validation(
                "at least one ticker is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            if ticker.is_empty() || ticker.chars().count() > MAX_TICKER_LEN {
                return Err(ConfigError::Validation(format!(
                    "ticker `{ticker}` must be between 1 and {MAX_TICKER_LEN} characters"
                )));
            }
            if !seen.insert(ticker.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "ticker `{ticker}` is listed more than once"
                )));
            }
        }

        if self.price_field.trim().is_empty() || self.date_column.trim().is_empty() {
            return Err(ConfigError::Validation(
                "price field and date column must be named".to_string(),
            ));
        }

        if self.start_date >= self.end_date {
            return Err(ConfigError::Validation(format!(
                "start date {} must precede end date {}",
                self.start_date, self.end_date
            )));
        }

        if self.rolling_window < 2 {
            return Err(ConfigError::Validation(format!(
                "rolling window must cover at least 2 observations, got {}",
                self.rolling_window
            )));
        }

        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::Validation(
                "risk-free rate must be finite".to_string(),
            ));
        }

        Ok(())
    }
}

//! Stateless analytics over a [`ReturnDataset`].
//!
//! Every function is a pure computation keyed by ticker. Degenerate inputs (empty series, a
//! single observation, zero variance) yield NaN or infinite values instead of errors so the
//! report layer can decide how to show the gap.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::TRADING_DAYS_PER_YEAR;
use crate::dataset::ReturnDataset;
use crate::logging::log_event;

/// `describe()`-style summary of one ticker's daily returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl DescriptiveStats {
    pub fn from_returns(returns: &[f64]) -> Self {
        let mut sorted: Vec<f64> = returns.iter().copied().filter(|r| !r.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        if count == 0 {
            return Self {
                count,
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                q25: f64::NAN,
                median: f64::NAN,
                q75: f64::NAN,
                max: f64::NAN,
            };
        }

        let mean = mean(&sorted);
        Self {
            count,
            mean,
            std: sample_variance(&sorted, mean).sqrt(),
            min: sorted[0],
            q25: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q75: quantile_sorted(&sorted, 0.75),
            max: sorted[count - 1],
        }
    }
}

/// Pairwise-complete Pearson correlations, rows and columns ordered like `tickers`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.values[i][j])
    }
}

pub type DatedSeries = Vec<(NaiveDate, f64)>;
/// A series whose leading positions may be undefined.
pub type WarmupSeries = Vec<(NaiveDate, Option<f64>)>;

pub fn descriptive_stats(dataset: &ReturnDataset) -> BTreeMap<String, DescriptiveStats> {
    let stats: BTreeMap<String, DescriptiveStats> = dataset
        .tickers()
        .into_iter()
        .map(|ticker| {
            let summary = DescriptiveStats::from_returns(&dataset.returns_for(&ticker));
            (ticker, summary)
        })
        .collect();

    log_event(
        file!(),
        "AnalyticsEngine",
        "descriptive_stats",
        "analytics.describe",
        line!(),
        &format!("Summarized daily returns for {} tickers", stats.len()),
        None,
    );

    stats
}

/// Running `prod(1 + r) - 1` over each ticker's own dates. Dates a ticker lacks never appear
/// in its series.
pub fn cumulative_returns(dataset: &ReturnDataset) -> BTreeMap<String, DatedSeries> {
    dataset
        .tickers()
        .into_iter()
        .map(|ticker| {
            let mut growth = 1.0;
            let curve = dataset
                .by_ticker(&ticker)
                .into_iter()
                .map(|(date, daily_return)| {
                    growth *= 1.0 + daily_return;
                    (date, growth - 1.0)
                })
                .collect();
            (ticker, curve)
        })
        .collect()
}

pub fn annualized_volatility(dataset: &ReturnDataset) -> BTreeMap<String, f64> {
    let scaling = TRADING_DAYS_PER_YEAR.sqrt();
    dataset
        .tickers()
        .into_iter()
        .map(|ticker| {
            let returns = skip_nan(&dataset.returns_for(&ticker));
            let volatility = sample_std(&returns) * scaling;
            (ticker, volatility)
        })
        .collect()
}

/// `(mean * 252 - risk_free_rate) / (std * sqrt(252))`; zero volatility gives an infinite or
/// NaN ratio.
pub fn sharpe_ratio(dataset: &ReturnDataset, risk_free_rate: f64) -> BTreeMap<String, f64> {
    let ratios: BTreeMap<String, f64> = dataset
        .tickers()
        .into_iter()
        .map(|ticker| {
            let returns = skip_nan(&dataset.returns_for(&ticker));
            let annual_return = mean(&returns) * TRADING_DAYS_PER_YEAR;
            let annual_volatility = sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
            (ticker, (annual_return - risk_free_rate) / annual_volatility)
        })
        .collect();

    let undefined: Vec<&str> = ratios
        .iter()
        .filter(|(_, ratio)| !ratio.is_finite())
        .map(|(ticker, _)| ticker.as_str())
        .collect();
    if !undefined.is_empty() {
        log_event(
            file!(),
            "AnalyticsEngine",
            "sharpe_ratio",
            "analytics.sharpe",
            line!(),
            &format!("Sharpe ratio undefined for {}", undefined.join(", ")),
            None,
        );
    }

    ratios
}

/// Pearson correlation over the dates where both tickers have a return. Each pair is computed
/// once and mirrored; the diagonal is 1.0.
pub fn correlation_matrix(dataset: &ReturnDataset) -> CorrelationMatrix {
    let tickers: Vec<String> = dataset.tickers().into_iter().collect();
    let pivot = dataset.pivot();
    let size = tickers.len();
    let mut values = vec![vec![1.0; size]; size];

    for i in 0..size {
        for j in (i + 1)..size {
            let (xs, ys): (Vec<f64>, Vec<f64>) = pivot
                .values()
                .filter_map(|row| match (row.get(&tickers[i]), row.get(&tickers[j])) {
                    (Some(x), Some(y)) if !x.is_nan() && !y.is_nan() => Some((*x, *y)),
                    _ => None,
                })
                .unzip();
            let corr = pearson(&xs, &ys);
            values[i][j] = corr;
            values[j][i] = corr;
        }
    }

    log_event(
        file!(),
        "AnalyticsEngine",
        "correlation_matrix",
        "analytics.correlation",
        line!(),
        &format!("Computed pairwise-complete correlations for {size} tickers"),
        None,
    );

    CorrelationMatrix { tickers, values }
}

/// Trailing-window sample volatility, annualized, aligned to each ticker's own dates. The first
/// `window - 1` positions are undefined.
pub fn rolling_volatility(dataset: &ReturnDataset, window: usize) -> BTreeMap<String, WarmupSeries> {
    let scaling = TRADING_DAYS_PER_YEAR.sqrt();
    let window = window.max(1);

    let tickers: Vec<String> = dataset.tickers().into_iter().collect();
    let rolling: BTreeMap<String, WarmupSeries> = tickers
        .into_par_iter()
        .map(|ticker| {
            let series = dataset.by_ticker(&ticker);
            let values: Vec<f64> = series.iter().map(|(_, r)| *r).collect();
            let mut output: WarmupSeries = series.iter().map(|(date, _)| (*date, None)).collect();

            for (offset, slice) in values.windows(window).enumerate() {
                output[offset + window - 1].1 = Some(sample_std(slice) * scaling);
            }

            (ticker, output)
        })
        .collect();

    log_event(
        file!(),
        "AnalyticsEngine",
        "rolling_volatility",
        "analytics.rolling",
        line!(),
        &format!("Computed {window}-observation rolling volatility for {} tickers", rolling.len()),
        None,
    );

    rolling
}

/// All report inputs computed from a single dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub risk_free_rate: f64,
    pub rolling_window: usize,
    pub stats: BTreeMap<String, DescriptiveStats>,
    pub cumulative: BTreeMap<String, DatedSeries>,
    pub volatility: BTreeMap<String, f64>,
    pub sharpe: BTreeMap<String, f64>,
    pub correlation: CorrelationMatrix,
    pub rolling: BTreeMap<String, WarmupSeries>,
}

impl AnalyticsReport {
    pub fn compute(dataset: &ReturnDataset, risk_free_rate: f64, rolling_window: usize) -> Self {
        Self {
            risk_free_rate,
            rolling_window,
            stats: descriptive_stats(dataset),
            cumulative: cumulative_returns(dataset),
            volatility: annualized_volatility(dataset),
            sharpe: sharpe_ratio(dataset, risk_free_rate),
            correlation: correlation_matrix(dataset),
            rolling: rolling_volatility(dataset, rolling_window),
        }
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.stats.keys().map(String::as_str).collect()
    }
}

fn skip_nan(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values, mean(values)).sqrt()
}

/// N-1 sample variance. A constant series is exactly zero, never a rounding residue of the mean.
fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    if values.iter().all(|value| *value == values[0]) {
        return 0.0;
    }

    let sum_squares = values
        .iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>();
    sum_squares / (values.len() as f64 - 1.0)
}

/// Linear interpolation between closest ranks on an ascending slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }

    let mean_x = mean(xs);
    let mean_y = mean(ys);
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    cov / (var_x * var_y).sqrt()
}

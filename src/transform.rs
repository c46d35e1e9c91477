use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PRICE_FIELD;
use crate::logging::log_event;
use crate::prices::{PriceColumn, PriceTable};

/// One long-form observation: the simple return of `ticker` on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub daily_return: f64,
}

impl ReturnRecord {
    pub fn new(date: NaiveDate, ticker: impl Into<String>, daily_return: f64) -> Self {
        Self {
            date,
            ticker: ticker.into(),
            daily_return,
        }
    }
}

/// Position-aligned simple returns `p[t] / p[t-1] - 1`.
///
/// The first position never has a return. A position whose own or prior price is absent, or
/// whose ratio is not finite, is `None` rather than zero.
pub fn simple_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut returns = Vec::with_capacity(prices.len());
    if prices.is_empty() {
        return returns;
    }

    returns.push(None);
    for window in prices.windows(2) {
        let pct = match (window[0], window[1]) {
            (Some(prev), Some(current)) => Some(current / prev - 1.0).filter(|r| r.is_finite()),
            _ => None,
        };
        returns.push(pct);
    }

    returns
}

/// Converts a wide `PriceTable` into long-form `ReturnRecord`s.
#[derive(Debug, Clone)]
pub struct ReturnTransformer {
    price_field: String,
}

impl Default for ReturnTransformer {
    fn default() -> Self {
        Self::with_field(DEFAULT_PRICE_FIELD)
    }
}

impl ReturnTransformer {
    pub fn with_field(field: &str) -> Self {
        Self {
            price_field: field.to_string(),
        }
    }

    /// Emit one record per `(date, ticker)` with a defined return, grouped by ticker in the
    /// order of `tickers`. Tickers without a matching column contribute nothing.
    pub fn transform(&self, prices: &PriceTable, tickers: &[String]) -> Vec<ReturnRecord> {
        let mut records = Vec::new();
        if prices.is_empty() {
            log_event(
                file!(),
                "ReturnTransformer",
                "transform",
                "transform.returns",
                line!(),
                "Received empty price table; no returns produced",
                None,
            );
            return records;
        }

        for ticker in tickers {
            let Some(column) = self.resolve_column(prices, tickers, ticker) else {
                log_event(
                    file!(),
                    "ReturnTransformer",
                    "transform",
                    "transform.returns",
                    line!(),
                    &format!("No {} column for {ticker}; skipping", self.price_field),
                    None,
                );
                continue;
            };

            let before = records.len();
            let returns = simple_returns(column.values());
            for (date, value) in prices.dates().iter().zip(returns) {
                if let Some(daily_return) = value {
                    records.push(ReturnRecord::new(*date, ticker.as_str(), daily_return));
                }
            }

            log_event(
                file!(),
                "ReturnTransformer",
                "transform",
                "transform.returns",
                line!(),
                &format!(
                    "Computed {} daily returns for {ticker} from {}",
                    records.len() - before,
                    column.header()
                ),
                None,
            );
        }

        records
    }

    /// A single requested instrument may arrive as an un-keyed column; it is normalized into
    /// that ticker's series.
    fn resolve_column<'a>(
        &self,
        prices: &'a PriceTable,
        tickers: &[String],
        ticker: &str,
    ) -> Option<&'a PriceColumn> {
        if tickers.len() == 1 && !prices.is_ticker_keyed() {
            return prices.column(&self.price_field, None);
        }
        prices.column(&self.price_field, Some(ticker))
    }
}

//! returnlab derives daily return series from wide price tables, persists them in long form,
//! and computes the descriptive and risk statistics rendered into a static report.

pub mod config;
pub mod dataset;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod prices;
pub mod report;
pub mod store;
pub mod transform;

pub use config::{ConfigError, PipelineConfig, TRADING_DAYS_PER_YEAR};
pub use dataset::{DatasetError, ReturnDataset, ReturnPivot};
pub use metrics::{
    AnalyticsReport, CorrelationMatrix, DescriptiveStats, annualized_volatility,
    correlation_matrix, cumulative_returns, descriptive_stats, rolling_volatility, sharpe_ratio,
};
pub use pipeline::{EtlSummary, PipelineError, run, run_analysis, run_etl};
pub use prices::{CsvPriceSource, PriceColumn, PriceError, PriceSource, PriceTable};
pub use report::{HtmlReportSink, ReportError, ReportSink, render_html};
pub use store::{CsvReturnStore, MemoryReturnStore, ReturnStore, StoreError};
pub use transform::{ReturnRecord, ReturnTransformer, simple_returns};

pub type Result<T> = anyhow::Result<T>;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};
use thiserror::Error;

use crate::logging::log_event;
use crate::metrics::AnalyticsReport;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

const STYLE: &str = "<style>
    body { font-family: Arial, sans-serif; margin: 40px; background-color: #f4f4f9; color: #333; }
    h1, h2 { color: #1a1a2e; }
    h1 { text-align: center; }
    .container { background-color: #fff; padding: 30px; border-radius: 8px; box-shadow: 0 0 15px rgba(0,0,0,0.1); }
    .table-container { overflow-x: auto; margin-bottom: 30px; }
    table { width: 100%; border-collapse: collapse; }
    th, td { padding: 12px 15px; border: 1px solid #ddd; text-align: left; }
    th { background-color: #1a1a2e; color: #fff; }
    tr:nth-child(even) { background-color: #f2f2f2; }
    .chart { width: 100%; margin-bottom: 30px; }
    p { line-height: 1.5; }
</style>";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Presentation layer for a computed [`AnalyticsReport`].
pub trait ReportSink {
    fn render(&mut self, report: &AnalyticsReport) -> Result<(), ReportError>;
}

/// Writes a self-contained HTML document; charts load Plotly from its CDN.
#[derive(Debug, Clone)]
pub struct HtmlReportSink {
    path: PathBuf,
    title: String,
    conclusion: Option<String>,
}

impl HtmlReportSink {
    pub fn new<P: AsRef<Path>>(path: P, title: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            title: title.into(),
            conclusion: None,
        }
    }

    /// Closing free-text section rendered after the analytics.
    pub fn with_conclusion(mut self, conclusion: Option<String>) -> Self {
        self.conclusion = conclusion;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for HtmlReportSink {
    fn render(&mut self, report: &AnalyticsReport) -> Result<(), ReportError> {
        let html = render_html(report, &self.title, self.conclusion.as_deref());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, html).map_err(|source| {
            log_event(
                file!(),
                "HtmlReportSink",
                "render",
                "report.render",
                line!(),
                &format!("Failed to write {}", self.path.display()),
                Some(&source.to_string()),
            );
            ReportError::Io {
                path: self.path.clone(),
                source,
            }
        })?;

        log_event(
            file!(),
            "HtmlReportSink",
            "render",
            "report.render",
            line!(),
            &format!("Rendered report for {} tickers to {}", report.tickers().len(), self.path.display()),
            None,
        );

        Ok(())
    }
}

/// Static HTML page: five numbered sections, plus a closing conclusions section when one is
/// supplied.
pub fn render_html(report: &AnalyticsReport, title: &str, conclusion: Option<&str>) -> String {
    let title = escape(title);
    let cumulative = line_chart(
        "cumulative-return",
        "Cumulative Return",
        report.cumulative.iter().map(|(ticker, series)| {
            let points = series.iter().map(|(date, value)| (date.to_string(), Some(*value)));
            (ticker.as_str(), points.collect::<Vec<_>>())
        }),
    );
    let rolling = line_chart(
        "rolling-volatility",
        "Annualized Volatility",
        report.rolling.iter().map(|(ticker, series)| {
            let points = series.iter().map(|(date, value)| (date.to_string(), *value));
            (ticker.as_str(), points.collect::<Vec<_>>())
        }),
    );

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <script src=\"{PLOTLY_CDN}\"></script>\n{STYLE}\n</head>\n<body>\n<div class=\"container\">\n\
         <h1>{title}</h1>\n"
    );

    html.push_str("<h2>1. Descriptive Statistics of Daily Returns</h2>\n");
    html.push_str(&stats_table(report));

    html.push_str("<h2>2. Cumulative Return</h2>\n");
    html.push_str(&cumulative);

    html.push_str("<h2>3. Annualized Risk and Return</h2>\n");
    html.push_str("<h3>Annualized Volatility</h3>\n");
    html.push_str(&scalar_table("annualized_volatility", &report.volatility));
    let _ = writeln!(
        html,
        "<h3>Sharpe Ratio (risk-free rate {:.2}%)</h3>",
        report.risk_free_rate * 100.0
    );
    html.push_str(&scalar_table("sharpe_ratio", &report.sharpe));

    html.push_str("<h2>4. Correlation of Daily Returns</h2>\n");
    html.push_str(&correlation_table(report));

    let _ = writeln!(
        html,
        "<h2>5. Rolling Volatility ({} observations)</h2>",
        report.rolling_window
    );
    html.push_str(&rolling);

    if let Some(text) = conclusion.map(str::trim).filter(|text| !text.is_empty()) {
        html.push_str("<h2>6. Key Conclusions</h2>\n");
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let _ = writeln!(html, "<p>{}</p>", escape(paragraph));
        }
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// One line trace per ticker. `None` points stay in the trace as gaps.
fn line_chart<'a, I>(id: &str, y_title: &str, series: I) -> String
where
    I: Iterator<Item = (&'a str, Vec<(String, Option<f64>)>)>,
{
    let mut plot = Plot::new();
    plot.set_layout(
        Layout::new()
            .auto_size(true)
            .height(480)
            .x_axis(Axis::new().title("Date"))
            .y_axis(Axis::new().title(y_title)),
    );

    for (ticker, points) in series {
        let (x, y): (Vec<String>, Vec<Option<f64>>) = points.into_iter().unzip();
        plot.add_trace(Scatter::new(x, y).mode(Mode::Lines).name(ticker));
    }

    format!("<div class=\"chart\">{}</div>\n", plot.to_inline_html(Some(id)))
}

fn stats_table(report: &AnalyticsReport) -> String {
    let mut html = String::from(
        "<div class=\"table-container\"><table><thead><tr><th>ticker</th><th>count</th>\
         <th>mean</th><th>std</th><th>min</th><th>25%</th><th>50%</th><th>75%</th><th>max</th>\
         </tr></thead><tbody>\n",
    );
    for (ticker, stats) in &report.stats {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td>{}</tr>",
            escape(ticker),
            stats.count,
            [
                stats.mean,
                stats.std,
                stats.min,
                stats.q25,
                stats.median,
                stats.q75,
                stats.max
            ]
            .iter()
            .map(|v| format!("<td>{}</td>", number(*v)))
            .collect::<String>()
        );
    }
    html.push_str("</tbody></table></div>\n");
    html
}

fn scalar_table(label: &str, values: &BTreeMap<String, f64>) -> String {
    let mut html = format!(
        "<div class=\"table-container\"><table><thead><tr><th>ticker</th><th>{label}</th></tr></thead><tbody>\n"
    );
    for (ticker, value) in values {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape(ticker),
            number(*value)
        );
    }
    html.push_str("</tbody></table></div>\n");
    html
}

fn correlation_table(report: &AnalyticsReport) -> String {
    let matrix = &report.correlation;
    let mut html = String::from("<div class=\"table-container\"><table><thead><tr><th>ticker</th>");
    for ticker in &matrix.tickers {
        let _ = write!(html, "<th>{}</th>", escape(ticker));
    }
    html.push_str("</tr></thead><tbody>\n");
    for (ticker, row) in matrix.tickers.iter().zip(&matrix.values) {
        let _ = write!(html, "<tr><td>{}</td>", escape(ticker));
        for value in row {
            let _ = write!(html, "<td>{}</td>", number(*value));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody></table></div>\n");
    html
}

fn number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{value:.6}")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

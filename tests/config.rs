use std::io::Write;

use chrono::NaiveDate;

use returnlab::{ConfigError, PipelineConfig};

#[test]
fn defaults_describe_a_valid_run() {
    let config = PipelineConfig::default();

    assert_eq!(config.tickers, vec!["NVDA", "QQQ"]);
    assert_eq!(config.price_field, "Close");
    assert_eq!(config.rolling_window, 30);
    assert_eq!(config.risk_free_rate, 0.0);
    assert_eq!(config.date_column, "Date");
    assert_eq!(config.conclusion, None);
    assert!(config.validate().is_ok());
}

#[test]
fn toml_file_overrides_defaults() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
tickers = ["AAPL", "MSFT", "SPY"]
start_date = "2020-01-01"
end_date = "2021-01-01"
risk_free_rate = 0.03
rolling_window = 20
date_column = "timestamp"
conclusion = "Tech led the period."
"#
    )?;

    let config = PipelineConfig::load(Some(file.path()))?;

    assert_eq!(config.tickers, vec!["AAPL", "MSFT", "SPY"]);
    assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
    assert_eq!(config.risk_free_rate, 0.03);
    assert_eq!(config.rolling_window, 20);
    assert_eq!(config.date_column, "timestamp");
    assert_eq!(config.conclusion.as_deref(), Some("Tech led the period."));
    // Untouched keys keep their defaults.
    assert_eq!(config.price_field, "Close");
    assert_eq!(config.report_title, PipelineConfig::default().report_title);

    Ok(())
}

#[test]
fn missing_config_file_is_a_load_error() {
    let result = PipelineConfig::load(Some("no/such/returnlab.toml".as_ref()));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn validation_rejects_unusable_settings() {
    let base = PipelineConfig::default();

    let cases = [
        PipelineConfig {
            tickers: vec![],
            ..base.clone()
        },
        PipelineConfig {
            tickers: vec!["NVDA".into(), "NVDA".into()],
            ..base.clone()
        },
        PipelineConfig {
            tickers: vec!["ELEVENCHARS".into()],
            ..base.clone()
        },
        PipelineConfig {
            tickers: vec![String::new()],
            ..base.clone()
        },
        PipelineConfig {
            end_date: base.start_date,
            ..base.clone()
        },
        PipelineConfig {
            rolling_window: 1,
            ..base.clone()
        },
        PipelineConfig {
            date_column: " ".into(),
            ..base.clone()
        },
        PipelineConfig {
            price_field: String::new(),
            ..base.clone()
        },
        PipelineConfig {
            risk_free_rate: f64::NAN,
            ..base.clone()
        },
    ];

    for config in cases {
        assert!(
            matches!(config.validate(), Err(ConfigError::Validation(_))),
            "expected rejection for {config:?}"
        );
    }
}

use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::Result;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "RETURNLAB_LOG";
pub const DEFAULT_DIRECTIVE: &str = "returnlab=info,warn";

static SUBSCRIBER: OnceLock<std::result::Result<(), String>> = OnceLock::new();

#[derive(Debug, Serialize)]
pub struct LogEvent<'a> {
    pub filename: &'a str,
    pub timestamp: DateTime<Utc>,
    pub component: &'a str,
    pub operation: &'a str,
    pub stage: &'a str,
    pub line_num: u32,
    pub error: Option<&'a str>,
    pub message: &'a str,
}

/// Install the JSON subscriber on stderr so CLI output on stdout stays clean.
///
/// The filter comes from `RETURNLAB_LOG`, then `RUST_LOG`, then [`DEFAULT_DIRECTIVE`]. Only
/// the first call installs anything; later calls return the first call's outcome.
pub fn init_logging() -> Result<()> {
    let result = SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(true)
            .try_init()
            .map_err(|error| format!("returnlab logging already configured elsewhere: {error}"))?;

        Ok(())
    });

    match result {
        Ok(()) => Ok(()),
        Err(message) => Err(anyhow!(message.clone())),
    }
}

/// Emit a structured pipeline event. Events carrying an error are raised to `warn`.
pub fn log_event(
    filename: &str,
    component: &str,
    operation: &str,
    stage: &str,
    line_num: u32,
    message: &str,
    error: Option<&str>,
) {
    let event = LogEvent {
        filename,
        timestamp: Utc::now(),
        component,
        operation,
        stage,
        line_num,
        error,
        message,
    };

    match (serde_json::to_string(&event), error) {
        (Ok(serialized), None) => info!(target: "returnlab", json = %serialized),
        (Ok(serialized), Some(_)) => warn!(target: "returnlab", json = %serialized),
        (Err(_), None) => info!(target: "returnlab", stage, message),
        (Err(_), Some(error)) => warn!(target: "returnlab", stage, message, error),
    }
}

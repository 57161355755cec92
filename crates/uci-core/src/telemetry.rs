//! Log sink initialisation.
//!
//! Call [`init_logs`] once at program start. Two sinks are installed on the
//! global subscriber:
//!
//! * the access sink receives every event at `log.accessLevel` and above,
//! * the error sink receives every event at `log.errorLevel` and above.
//!
//! Each sink writes to `stdout`, `stderr` or an appended file, as text or as
//! newline-delimited JSON (`log.format`).

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use crate::config::LogConfig;
use crate::error::{Result, UciError};

/// Parse a level token (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(token: &str) -> Result<Level> {
    match token.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(UciError::InvalidConfig(format!(
            "unknown log level: {other}"
        ))),
    }
}

/// Install the access and error sinks on the global subscriber.
///
/// Returns `UciError::Logging` when a global subscriber is already set.
pub fn init_logs(config: &LogConfig) -> Result<()> {
    let access_level = parse_level(&config.access_level)?;
    let error_level = parse_level(&config.error_level)?;
    let json = config.format == "json";

    let (access_writer, access_ansi) = sink_writer(&config.access_log)?;
    let (error_writer, error_ansi) = sink_writer(&config.error_log)?;

    let layers = vec![
        sink_layer(access_writer, access_level, json, access_ansi),
        sink_layer(error_writer, error_level, json, error_ansi),
    ];

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| UciError::Logging(e.to_string()))
}

/// Resolve a sink target into a writer, and whether it may carry ANSI colors.
fn sink_writer(target: &str) -> Result<(BoxMakeWriter, bool)> {
    match target.trim() {
        "" | "stdout" => Ok((BoxMakeWriter::new(std::io::stdout), true)),
        "stderr" => Ok((BoxMakeWriter::new(std::io::stderr), true)),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| UciError::Logging(format!("cannot open log file {path}: {e}")))?;
            Ok((BoxMakeWriter::new(Mutex::new(file)), false))
        }
    }
}

fn sink_layer<S>(
    writer: BoxMakeWriter,
    level: Level,
    json: bool,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter = LevelFilter::from_level(level);
    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(false)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_filter(filter)
            .boxed()
    }
}

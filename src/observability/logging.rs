//! Structured logging.
//!
//! Console output uses the default `tracing-subscriber` formatter. The
//! append-only log file gets one line per event in the form
//! `[<RFC 3339 UTC timestamp>] <message> <fields>`.

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file: {0}")]
    Io(#[from] io::Error),

    #[error("logging already initialised: {0}")]
    Init(#[from] TryInitError),
}

/// Prefix written before every log-file line.
pub fn line_prefix(at: DateTime<Utc>) -> String {
    format!("[{}] ", at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Event formatter for the log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketedFormat;

impl<S, N> FormatEvent<S, N> for BracketedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writer.write_str(&line_prefix(Utc::now()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initialise console and file logging.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &ObservabilityConfig, log_file: &Path) -> Result<(), LoggingError> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .event_format(BracketedFormat)
                .with_writer(Mutex::new(file)),
        )
        .try_init()?;

    Ok(())
}

//! Structured logging for the station
//!
//! Output format and level come from the environment so the same binary can
//! log JSON on the device and readable text on a developer machine.
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG, TRACE (default INFO)
//! - `LOG_FORMAT`: json, pretty, compact (default json)
//! - `LOG_SPANS`: emit span open/close events when `true` (default false)
//! - `RUST_LOG`: full filter override
//!
//! ```bash
//! LOG_FORMAT=compact LOG_LEVEL=DEBUG dht-station run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Machine-readable, one JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single-line, colored, no targets
    Compact,
}

impl LogFormat {
    /// Parse log format from string, falling back to JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
}

impl LogSettings {
    /// Read settings from `LOG_LEVEL`, `LOG_FORMAT` and `LOG_SPANS`
    pub fn from_env() -> Self {
        Self {
            level: parse_level(&env::var("LOG_LEVEL").unwrap_or_default()),
            format: LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default()),
            include_spans: parse_flag(&env::var("LOG_SPANS").unwrap_or_default()),
        }
    }

    /// Raise the level for each `-v` given on the command line
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = match verbose {
            0 => self.level,
            1 => std::cmp::max(self.level, Level::DEBUG),
            _ => Level::TRACE,
        };
        self
    }
}

/// Map a level name to a `tracing` level; unknown names mean INFO
pub fn parse_level(value: &str) -> Level {
    match value.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn span_events(include_spans: bool) -> FmtSpan {
    if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    let filter = EnvFilter::new(level.to_string());
    // rumqttc logs every packet at debug
    match "rumqttc=warn".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Install the global subscriber
pub fn init_logging(settings: LogSettings) {
    let subscriber = tracing_subscriber::registry().with(build_filter(settings.level));
    let spans = span_events(settings.include_spans);

    match settings.format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_span_events(spans))
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(fmt::layer().pretty().with_ansi(true).with_span_events(spans))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_ansi(true)
                        .with_target(false)
                        .with_span_events(spans),
                )
                .init();
        }
    }
}

/// Span around a network link transition
#[macro_export]
macro_rules! link_span {
    ($($field:tt)*) => {
        tracing::info_span!("link", $($field)*)
    };
}

/// Span around a session transition or reconnect sequence
#[macro_export]
macro_rules! session_span {
    ($($field:tt)*) => {
        tracing::info_span!("session", $($field)*)
    };
}

/// Span around one read-and-publish cycle
#[macro_export]
macro_rules! publish_span {
    ($($field:tt)*) => {
        tracing::info_span!("publish_cycle", $($field)*)
    };
}

pub use {link_span, publish_span, session_span};

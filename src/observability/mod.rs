//! Observability for the station: structured logging and counters

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LogSettings};
pub use metrics::{MetricsSnapshot, StationMetrics};

// Span macros for structured logging
pub use logging::{link_span, publish_span, session_span};

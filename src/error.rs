//! Error taxonomy for the telemetry station
//!
//! Every runtime error here is recoverable: link errors are retried by
//! [`LinkState`](crate::link::LinkState), session errors funnel into the gated
//! reconnect of [`SessionState`](crate::session::SessionState), and sensor
//! errors skip a single publish cycle. Only startup errors (configuration,
//! broker URL) ever reach the binary's exit path.

use crate::session::SessionStatus;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error for station construction and startup
#[derive(Debug, Error)]
pub enum StationError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Network error: {0}")]
    Link(#[from] LinkError),

    #[error("Supervisor already started")]
    AlreadyStarted,

    #[error("Publish interval {interval:?} must exceed minimum read spacing {spacing:?}")]
    IntervalTooShort { interval: Duration, spacing: Duration },
}

/// Lower-layer (network link) failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("Link disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Network stack rejected connect request: {0}")]
    ConnectRejected(String),
}

/// Coarse classification used when logging session failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Socket or TCP-level failure underneath the session
    Transport,
    /// Anything else: broker refusal, protocol violation, local refusal
    Other,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionErrorKind::Transport => write!(f, "transport"),
            SessionErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Upper-layer (pub/sub session) failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transport I/O failure: {0}")]
    Transport(#[source] std::io::Error),

    #[error("Broker closed the session")]
    BrokerDisconnect,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session not open - current status: {status:?}")]
    NotOpen { status: SessionStatus },

    #[error("Publishing failed: {0}")]
    PublishFailed(String),

    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

impl SessionError {
    /// Classify the error for logging
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::Transport(_) => SessionErrorKind::Transport,
            _ => SessionErrorKind::Other,
        }
    }
}

/// Sensor read failures; each one costs exactly one publish cycle
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Sensor frame checksum mismatch")]
    Checksum,

    #[error("Sensor did not respond in time")]
    Timeout,

    #[error("Sensor I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Invalid sensor data: {0}")]
    InvalidData(String),
}

impl SensorError {
    /// Short label for structured logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            SensorError::Checksum => "checksum",
            SensorError::Timeout => "timeout",
            SensorError::Io(_) => "io",
            SensorError::InvalidData(_) => "invalid_data",
        }
    }
}

/// Condition gate wait failures
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("Timed out waiting for ready flags")]
    TimedOut,

    #[error("Condition gate closed")]
    Closed,
}

/// Result type for station startup operations
pub type StationResult<T> = Result<T, StationError>;

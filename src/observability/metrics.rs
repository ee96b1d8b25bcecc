//! Counters for link, session and publish activity
//!
//! A single [`StationMetrics`] is owned by the supervisor and shared by `Arc`
//! with every component that records into it. All counters are relaxed
//! atomics: they are monotonically increasing tallies, never used for
//! synchronization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe station counters
#[derive(Debug)]
pub struct StationMetrics {
    started_at: DateTime<Utc>,

    // Link layer
    link_drops: AtomicU64,
    connect_requests: AtomicU64,

    // Session layer
    session_opens: AtomicU64,
    session_closes: AtomicU64,
    reconnect_attempts: AtomicU64,
    messages_received: AtomicU64,

    // Publish cycle
    cycles: AtomicU64,
    readings_published: AtomicU64,
    publish_refusals: AtomicU64,
    sensor_failures: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub link_drops: u64,
    pub connect_requests: u64,
    pub session_opens: u64,
    pub session_closes: u64,
    pub reconnect_attempts: u64,
    pub messages_received: u64,
    pub cycles: u64,
    pub readings_published: u64,
    pub publish_refusals: u64,
    pub sensor_failures: u64,
}

impl Default for StationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StationMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            link_drops: AtomicU64::new(0),
            connect_requests: AtomicU64::new(0),
            session_opens: AtomicU64::new(0),
            session_closes: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            readings_published: AtomicU64::new(0),
            publish_refusals: AtomicU64::new(0),
            sensor_failures: AtomicU64::new(0),
        }
    }

    pub fn link_dropped(&self) {
        self.link_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_requested(&self) {
        self.connect_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.session_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.session_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_attempted(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycle_started(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one scalar accepted by the session
    pub fn reading_published(&self) {
        self.readings_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_refused(&self) {
        self.publish_refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sensor_failed(&self) {
        self.sensor_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Utc::now();
        MetricsSnapshot {
            timestamp: now,
            uptime_seconds: (now - self.started_at).num_seconds(),
            link_drops: self.link_drops.load(Ordering::Relaxed),
            connect_requests: self.connect_requests.load(Ordering::Relaxed),
            session_opens: self.session_opens.load(Ordering::Relaxed),
            session_closes: self.session_closes.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            readings_published: self.readings_published.load(Ordering::Relaxed),
            publish_refusals: self.publish_refusals.load(Ordering::Relaxed),
            sensor_failures: self.sensor_failures.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Render as a single JSON line for the periodic log record
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

//! Periodic read-and-publish task

use crate::error::{SensorError, StationError};
use crate::gate::{ConditionGate, ReadyFlags};
use crate::observability::StationMetrics;
use crate::publish_span;
use crate::sensor::{Reading, SensorSource};
use crate::session::SessionState;
use crate::transport::Delivery;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Scheduler settings taken from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSettings {
    pub interval: Duration,
    pub temperature_topic: String,
    pub humidity_topic: String,
}

/// What a single cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Both scalars were handed to the session
    Published,
    /// At least one publish was refused
    PartiallyRefused { accepted: usize },
    /// The sensor read failed; nothing was published
    SensorFailed,
}

/// Gate-driven sensor publisher
pub struct PublishScheduler {
    gate: ConditionGate,
    session: Arc<SessionState>,
    sensor: Arc<dyn SensorSource>,
    metrics: Arc<StationMetrics>,
    settings: PublishSettings,
}

impl PublishScheduler {
    /// Refuses an interval that does not exceed the sensor's read spacing
    pub fn new(
        gate: ConditionGate,
        session: Arc<SessionState>,
        sensor: Arc<dyn SensorSource>,
        metrics: Arc<StationMetrics>,
        settings: PublishSettings,
    ) -> Result<Self, StationError> {
        let spacing = sensor.min_read_spacing();
        if settings.interval <= spacing {
            return Err(StationError::IntervalTooShort {
                interval: settings.interval,
                spacing,
            });
        }

        Ok(Self {
            gate,
            session,
            sensor,
            metrics,
            settings,
        })
    }

    pub fn interval(&self) -> Duration {
        self.settings.interval
    }

    /// Run forever: wait for the session, read, publish, sleep
    pub async fn run(self) {
        info!(interval = ?self.settings.interval, "Publish scheduler started");
        loop {
            if self.gate.wait_all(ReadyFlags::SESSION_UP, None).await.is_err() {
                warn!("Condition gate closed; publish scheduler stopping");
                return;
            }

            let cycle = self.metrics.snapshot().cycles;
            self.run_cycle().instrument(publish_span!(cycle)).await;
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// One read-and-publish pass; assumes the caller waited on the gate
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.metrics.cycle_started();

        let reading = match self.read_sensor().await {
            Ok(reading) => reading,
            Err(e) => {
                self.metrics.sensor_failed();
                warn!(kind = e.label(), error = %e, "Sensor read failed; skipping cycle");
                return CycleOutcome::SensorFailed;
            }
        };

        let humidity = reading.humidity_payload();
        let temperature = reading.temperature_payload();
        info!(%temperature, %humidity, "Sensor reading");

        let mut accepted = 0;
        for (topic, payload) in [
            (&self.settings.humidity_topic, humidity),
            (&self.settings.temperature_topic, temperature),
        ] {
            match self
                .session
                .publish(topic, payload.as_bytes(), Delivery::AtLeastOnce)
            {
                Ok(()) => {
                    self.metrics.reading_published();
                    accepted += 1;
                    debug!(topic = %topic, payload = %payload, "Published");
                }
                Err(e) => {
                    self.metrics.publish_refused();
                    warn!(topic = %topic, kind = %e.kind(), error = %e, "Publish refused");
                }
            }
        }

        info!(metrics = %self.metrics.snapshot().to_json(), "Cycle complete");

        if accepted == 2 {
            CycleOutcome::Published
        } else {
            CycleOutcome::PartiallyRefused { accepted }
        }
    }

    async fn read_sensor(&self) -> Result<Reading, SensorError> {
        let sensor = Arc::clone(&self.sensor);
        tokio::task::spawn_blocking(move || sensor.read())
            .await
            .unwrap_or_else(|join_error| {
                Err(SensorError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    join_error.to_string(),
                )))
            })
    }
}

//! Mock implementations for testing
//!
//! Provides mock NetworkStack, SessionTransport and SensorSource
//! implementations so the supervisor can be exercised without a radio, a
//! broker or a sensor.

use crate::error::{LinkError, SensorError, SessionError};
use crate::gate::{ConditionGate, ReadyFlags};
use crate::sensor::{Reading, SensorSource};
use crate::transport::{Delivery, NetworkEvent, NetworkStack, SessionTransport};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock network stack that records connect requests
#[derive(Debug, Default)]
pub struct MockNetworkStack {
    starts: AtomicUsize,
    connects: AtomicUsize,
    reject: AtomicBool,
    events: Option<mpsc::Sender<NetworkEvent>>,
}

impl MockNetworkStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `start()` with a StartRequested notification like a real stack
    pub fn with_events(events: mpsc::Sender<NetworkEvent>) -> Self {
        Self {
            events: Some(events),
            ..Default::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make subsequent connect requests fail synchronously
    pub fn reject_connects(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl NetworkStack for MockNetworkStack {
    fn start(&self) -> Result<(), LinkError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.events {
            events
                .try_send(NetworkEvent::StartRequested)
                .map_err(|e| LinkError::ConnectRejected(e.to_string()))?;
        }
        Ok(())
    }

    fn connect(&self) -> Result<(), LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(LinkError::ConnectRejected("mock rejection".to_string()));
        }
        Ok(())
    }
}

/// A message handed to the mock session transport
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub destination: String,
    pub payload: Vec<u8>,
    pub delivery: Delivery,
    /// Gate flags at the moment of the publish, when a gate is attached
    pub flags: Option<ReadyFlags>,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).to_string()
    }
}

/// Mock session transport that records requests
#[derive(Debug, Default)]
pub struct MockSessionTransport {
    establishes: AtomicUsize,
    reconnects: AtomicUsize,
    fail: AtomicBool,
    published: Mutex<Vec<PublishedMessage>>,
    gate: Option<ConditionGate>,
}

impl MockSessionTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the gate flags observed at each publish
    pub fn with_gate(gate: ConditionGate) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn establish_count(&self) -> usize {
        self.establishes.load(Ordering::SeqCst)
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Total session attempts of either kind
    pub fn attempt_count(&self) -> usize {
        self.establish_count() + self.reconnect_count()
    }

    /// Make establish/reconnect/publish fail with a transport error
    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    pub fn published_to(&self, destination: &str) -> Vec<String> {
        lock(&self.published)
            .iter()
            .filter(|message| message.destination == destination)
            .map(PublishedMessage::payload_str)
            .collect()
    }

    fn failure(&self) -> Result<(), SessionError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(SessionError::Transport(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock transport failure",
            )))
        } else {
            Ok(())
        }
    }
}

impl SessionTransport for MockSessionTransport {
    fn establish(&self) -> Result<(), SessionError> {
        self.establishes.fetch_add(1, Ordering::SeqCst);
        self.failure()
    }

    fn reconnect(&self) -> Result<(), SessionError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.failure()
    }

    fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), SessionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::PublishFailed("mock publish failure".to_string()));
        }
        lock(&self.published).push(PublishedMessage {
            destination: destination.to_string(),
            payload: payload.to_vec(),
            delivery,
            flags: self.gate.as_ref().map(ConditionGate::flags),
        });
        Ok(())
    }
}

/// Scripted sensor
///
/// Returns queued results in order, then the fallback reading forever.
#[derive(Debug)]
pub struct MockSensor {
    script: Mutex<VecDeque<Result<Reading, SensorError>>>,
    fallback: Reading,
    reads: AtomicUsize,
    spacing: Duration,
}

impl MockSensor {
    pub fn new(fallback: Reading) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            reads: AtomicUsize::new(0),
            spacing: Duration::from_secs(2),
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Queue results returned before the fallback
    pub fn with_script(self, results: Vec<Result<Reading, SensorError>>) -> Self {
        lock(&self.script).extend(results);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SensorSource for MockSensor {
    fn read(&self) -> Result<Reading, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        lock(&self.script).pop_front().unwrap_or(Ok(self.fallback))
    }

    fn min_read_spacing(&self) -> Duration {
        self.spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sensor_script_then_fallback() {
        let sensor = MockSensor::new(Reading::new(20.0, 50.0))
            .with_script(vec![Err(SensorError::Checksum), Ok(Reading::new(1.0, 2.0))]);

        assert!(matches!(sensor.read(), Err(SensorError::Checksum)));
        assert_eq!(sensor.read().unwrap(), Reading::new(1.0, 2.0));
        assert_eq!(sensor.read().unwrap(), Reading::new(20.0, 50.0));
        assert_eq!(sensor.read_count(), 3);
    }

    #[test]
    fn test_mock_transport_records_flags() {
        let gate = ConditionGate::new();
        gate.set(ReadyFlags::SESSION_UP);
        let transport = MockSessionTransport::with_gate(gate);

        transport
            .publish("station/humidity", b"54.7", Delivery::AtLeastOnce)
            .unwrap();

        let published = transport.published();
        assert_eq!(published[0].flags, Some(ReadyFlags::SESSION_UP));
        assert_eq!(transport.published_to("station/humidity"), vec!["54.7"]);
    }

    #[test]
    fn test_mock_network_rejection() {
        let network = MockNetworkStack::new();
        assert!(network.connect().is_ok());
        network.reject_connects(true);
        assert!(network.connect().is_err());
        assert_eq!(network.connect_count(), 2);
    }
}

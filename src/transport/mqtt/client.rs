//! MQTT session transport over `rumqttc::v5`
//!
//! A driver task owns the event loop. It stays parked until the supervisor
//! asks for a session, polls until the connection fails, reports the failure
//! and parks again. Nothing reconnects on its own: the session layer decides
//! when the link is healthy enough to try.

use super::connection::{configure_mqtt_options, qos_for};
use super::event_router::{classify_connection_error, route_event, EventRoute};
use crate::config::MqttSection;
use crate::error::SessionError;
use crate::transport::{Delivery, SessionEvent, SessionTransport};
use rumqttc::v5::{AsyncClient, ConnectionError, Event, EventLoop};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Request channel capacity between the client handle and the event loop
const REQUEST_CAPACITY: usize = 10;

/// Session transport backed by an MQTT v5 client
pub struct MqttSession {
    client: Arc<Mutex<AsyncClient>>,
    wake: Arc<Notify>,
    driver: JoinHandle<()>,
}

impl MqttSession {
    /// Create the client and spawn its parked driver
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        station_id: &str,
        config: MqttSection,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let (client, event_loop) = create_connection(station_id, &config)?;
        let client = Arc::new(Mutex::new(client));
        let wake = Arc::new(Notify::new());

        let driver = runtime.spawn(drive(
            Driver {
                station_id: station_id.to_string(),
                config,
                client: Arc::clone(&client),
                wake: Arc::clone(&wake),
                events,
            },
            event_loop,
        ));

        Ok(Self {
            client,
            wake,
            driver,
        })
    }

    /// True while the driver task is alive
    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl SessionTransport for MqttSession {
    fn establish(&self) -> Result<(), SessionError> {
        debug!("Session establish requested");
        self.wake.notify_one();
        Ok(())
    }

    fn reconnect(&self) -> Result<(), SessionError> {
        debug!("Session reconnect requested");
        self.wake.notify_one();
        Ok(())
    }

    fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), SessionError> {
        let client = self
            .client
            .lock()
            .map(|client| client.clone())
            .map_err(|_| SessionError::PublishFailed("client handle poisoned".to_string()))?;

        client
            .try_publish(destination, qos_for(delivery), false, payload.to_vec())
            .map_err(|e| SessionError::PublishFailed(e.to_string()))
    }
}

/// Helper to create a fresh client and event loop pair
fn create_connection(
    station_id: &str,
    config: &MqttSection,
) -> Result<(AsyncClient, EventLoop), SessionError> {
    let mqtt_options = configure_mqtt_options(station_id, config)?;
    Ok(AsyncClient::new(mqtt_options, REQUEST_CAPACITY))
}

struct Driver {
    station_id: String,
    config: MqttSection,
    client: Arc<Mutex<AsyncClient>>,
    wake: Arc<Notify>,
    events: mpsc::Sender<SessionEvent>,
}

enum Step {
    Restart,
    Polled(Result<Event, ConnectionError>),
}

impl Driver {
    /// Forward an event; false once nobody is listening
    async fn emit(&self, event: SessionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Replace the live connection with a fresh one
    fn rebuild(&self) -> Result<EventLoop, SessionError> {
        let (client, event_loop) = create_connection(&self.station_id, &self.config)?;
        if let Ok(mut shared) = self.client.lock() {
            *shared = client;
        }
        Ok(event_loop)
    }
}

async fn drive(driver: Driver, mut event_loop: EventLoop) {
    loop {
        driver.wake.notified().await;
        info!(broker = %driver.config.broker_url, "Opening MQTT session");

        // Poll until the connection ends, then park again
        loop {
            let step = tokio::select! {
                _ = driver.wake.notified() => Step::Restart,
                polled = event_loop.poll() => Step::Polled(polled),
            };

            let keep_polling = match step {
                Step::Restart => {
                    // A reconnect was requested while the old connection still looked alive
                    warn!("Dropping live MQTT connection for requested reconnect");
                    match driver.rebuild() {
                        Ok(fresh) => {
                            event_loop = fresh;
                            true
                        }
                        Err(e) => {
                            if !driver.emit(SessionEvent::Closed(e)).await {
                                return;
                            }
                            false
                        }
                    }
                }
                Step::Polled(Ok(event)) => match route_event(&event) {
                    EventRoute::Established => driver.emit(SessionEvent::Established).await,
                    EventRoute::MessageReceived { topic, payload } => {
                        driver
                            .emit(SessionEvent::MessageReceived { topic, payload })
                            .await
                    }
                    EventRoute::Acknowledged { message_id } => {
                        driver
                            .emit(SessionEvent::Acknowledged { message_id })
                            .await
                    }
                    EventRoute::BrokerDisconnect => {
                        if !driver
                            .emit(SessionEvent::Closed(SessionError::BrokerDisconnect))
                            .await
                        {
                            return;
                        }
                        false
                    }
                    EventRoute::Ignored(detail) => {
                        trace!(event = %detail, "MQTT event");
                        true
                    }
                },
                Step::Polled(Err(e)) => {
                    let error = classify_connection_error(e);
                    if !driver.emit(SessionEvent::Closed(error)).await {
                        return;
                    }
                    false
                }
            };

            if driver.events.is_closed() {
                return;
            }
            if !keep_polling {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use crate::error::SessionErrorKind;
    use crate::transport::session_channel;
    use std::time::Duration;

    fn unreachable_broker_config() -> MqttSection {
        let mut config = StationConfig::test_config().mqtt;
        // Port 1 on loopback refuses connections
        config.broker_url = "mqtt://127.0.0.1:1".to_string();
        config
    }

    #[tokio::test]
    async fn test_driver_stays_parked_until_establish() {
        let (tx, mut rx) = session_channel();
        let session = MqttSession::new("test-station", unreachable_broker_config(), tx).unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "no event expected before establish");
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_transport_close() {
        let (tx, mut rx) = session_channel();
        let session = MqttSession::new("test-station", unreachable_broker_config(), tx).unwrap();

        session.establish().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("close event")
            .expect("channel open");
        match event {
            SessionEvent::Closed(error) => assert_eq!(error.kind(), SessionErrorKind::Transport),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_driver_parks_after_failure_and_retries_on_reconnect() {
        let (tx, mut rx) = session_channel();
        let session = MqttSession::new("test-station", unreachable_broker_config(), tx).unwrap();

        session.establish().unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(first, Ok(Some(SessionEvent::Closed(_)))));

        // Parked: no further attempts on its own
        let idle = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(idle.is_err());

        session.reconnect().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(second, Ok(Some(SessionEvent::Closed(_)))));
    }

    #[tokio::test]
    async fn test_publish_queues_without_connection() {
        let (tx, _rx) = session_channel();
        let session = MqttSession::new("test-station", unreachable_broker_config(), tx).unwrap();

        let result = session.publish("station/humidity", b"54.7", Delivery::AtLeastOnce);
        assert!(result.is_ok());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let (tx, _rx) = session_channel();
        let result = MqttSession::new("test-station", unreachable_broker_config(), tx);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_broker_url() {
        let (tx, _rx) = session_channel();
        let mut config = unreachable_broker_config();
        config.broker_url = "not-a-url".to_string();

        let result = MqttSession::new("test-station", config, tx);
        assert!(matches!(result, Err(SessionError::InvalidBrokerUrl(_))));
    }
}

//! End-to-end connectivity scenarios against mock collaborators
//!
//! All tests run on a paused clock, so minutes of station time pass instantly.


use dht_station::error::{SensorError, SessionError};
use dht_station::sensor::Reading;
use dht_station::testing::mocks::{MockNetworkStack, MockSensor, MockSessionTransport};
use dht_station::transport::{
    network_channel, session_channel, Delivery, NetworkEvent, SessionEvent,
};
use dht_station::{Collaborators, LinkStatus, ReadyFlags, SessionStatus, Supervisor};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;

#[tokio::test(start_paused = true)]
async fn test_address_before_start_is_ignored() {
    // Arrange: a network stack that never reports StartRequested
    let (network_tx, network_rx) = network_channel();
    let (_session_tx, session_rx) = session_channel();
    let network = Arc::new(MockNetworkStack::new());
    let transport = Arc::new(MockSessionTransport::new());
    let mut supervisor = Supervisor::new(
        &test_config(),
        Collaborators {
            network: network.clone(),
            transport: transport.clone(),
            sensor: Arc::new(MockSensor::new(Reading::new(20.0, 50.0))),
        },
    )
    .unwrap();
    supervisor.start(network_rx, session_rx).unwrap();

    // Act
    network_tx
        .send(NetworkEvent::AddressAcquired { address: address() })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // Assert
    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot.link, LinkStatus::Down);
    assert!(snapshot.flags.is_empty());
    assert_eq!(transport.attempt_count(), 0);
    assert_eq!(network.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_to_first_publish() {
    // Arrange
    let harness = Harness::with_reading(21.3, 54.7);
    settle().await;
    assert_eq!(harness.supervisor.snapshot().link, LinkStatus::Connecting);
    assert_eq!(harness.network.connect_count(), 1);

    // Act: link comes up
    harness.acquire_address().await;

    // Assert: session waited for the link, then established once
    let snapshot = harness.supervisor.snapshot();
    assert_eq!(snapshot.link, LinkStatus::Up);
    assert_eq!(snapshot.session, SessionStatus::Connecting);
    assert_flags_match_status(&snapshot);
    assert_eq!(harness.transport.establish_count(), 1);
    assert_eq!(harness.sensor.read_count(), 0);

    // Act: broker accepts
    harness.session_event(SessionEvent::Established).await;

    // Assert
    let snapshot = harness.supervisor.snapshot();
    assert_eq!(snapshot.session, SessionStatus::Open);
    assert!(snapshot.session_up());
    assert_flags_match_status(&snapshot);
    assert!(eventually(|| harness.readings_published() == 2).await);
    assert_eq!(harness.sensor.read_count(), 1);

    let liveness = harness.transport.published_to(LIVENESS_TOPIC);
    assert_eq!(liveness, vec!["data"]);
    assert_eq!(
        harness.transport.published()[0].delivery,
        Delivery::AtMostOnce
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_session_and_blocks_scheduler() {
    // Arrange
    let harness = Harness::with_reading(21.3, 54.7);
    harness.bring_up().await;
    assert!(eventually(|| harness.sensor.read_count() == 1).await);

    // Act
    harness.disconnect("beacon timeout").await;

    // Assert
    let snapshot = harness.supervisor.snapshot();
    // Down is passed through; the immediate re-connect leaves it Connecting
    assert_eq!(snapshot.link, LinkStatus::Connecting);
    assert!(!snapshot.link_up());
    assert_eq!(snapshot.session, SessionStatus::Closed);
    assert!(!snapshot.session_up());
    assert_flags_match_status(&snapshot);
    assert_eq!(harness.network.connect_count(), 2);

    // Scheduler stays blocked for many intervals
    let reads = harness.sensor.read_count();
    let published = harness.readings_published();
    tokio::time::sleep(INTERVAL * 10).await;
    assert_eq!(harness.sensor.read_count(), reads);
    assert_eq!(harness.readings_published(), published);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_disconnects_issue_one_connect_each() {
    let harness = Harness::with_reading(21.3, 54.7);
    settle().await;

    for _ in 0..4 {
        harness.disconnect("association rejected").await;
    }

    assert_eq!(harness.network.connect_count(), 5);
    assert_eq!(harness.supervisor.snapshot().link, LinkStatus::Connecting);
    assert_eq!(harness.transport.attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_three_sensor_failures_keep_cadence() {
    // Arrange
    let sensor = MockSensor::new(Reading::new(22.0, 40.0)).with_script(vec![
        Err(SensorError::Checksum),
        Err(SensorError::Timeout),
        Err(SensorError::Io(io::Error::new(io::ErrorKind::Other, "bus fault"))),
    ]);
    let harness = Harness::start(sensor);
    harness.bring_up().await;

    // Act + Assert: one read per interval, nothing published while failing
    assert!(eventually(|| harness.sensor.read_count() == 1).await);
    assert_eq!(harness.readings_published(), 0);

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(harness.sensor.read_count(), 2);
    assert_eq!(harness.readings_published(), 0);

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(harness.sensor.read_count(), 3);
    assert_eq!(harness.readings_published(), 0);

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(harness.sensor.read_count(), 4);
    assert_eq!(harness.readings_published(), 2);

    let metrics = harness.supervisor.metrics().snapshot();
    assert_eq!(metrics.sensor_failures, 3);
    assert_eq!(metrics.readings_published, 2);
}

#[tokio::test(start_paused = true)]
async fn test_reading_formatted_to_destinations() {
    let harness = Harness::with_reading(21.3, 54.7);
    harness.bring_up().await;
    assert!(eventually(|| harness.readings_published() == 2).await);

    assert_eq!(harness.transport.published_to(HUMIDITY_TOPIC), vec!["54.7"]);
    assert_eq!(harness.transport.published_to(TEMPERATURE_TOPIC), vec!["21.3"]);

    // Humidity goes out first, both at least once
    let readings: Vec<_> = harness
        .transport
        .published()
        .into_iter()
        .filter(|message| message.destination != LIVENESS_TOPIC)
        .collect();
    assert_eq!(readings[0].destination, HUMIDITY_TOPIC);
    assert_eq!(readings[1].destination, TEMPERATURE_TOPIC);
    assert!(readings
        .iter()
        .all(|message| message.delivery == Delivery::AtLeastOnce));
}

#[tokio::test(start_paused = true)]
async fn test_session_never_open_while_link_down_under_churn() {
    // Arrange
    let harness = Harness::with_reading(19.5, 61.0);
    let violations = Arc::new(AtomicUsize::new(0));
    let observer = {
        let violations = Arc::clone(&violations);
        let link = Arc::clone(harness.supervisor.link());
        let session = Arc::clone(harness.supervisor.session());
        tokio::spawn(async move {
            loop {
                session.observe(|session_status| {
                    let (link_status, flags) = link.status_with_flags();
                    let session_open = session_status == SessionStatus::Open;
                    if session_open && link_status != LinkStatus::Up {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    if flags.contains(ReadyFlags::SESSION_UP) != session_open
                        || flags.contains(ReadyFlags::LINK_UP) != (link_status == LinkStatus::Up)
                    {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                });
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    // Act: flap the link and session repeatedly
    for round in 0..10 {
        harness.acquire_address().await;
        tokio::time::sleep(COOLDOWN + Duration::from_secs(1)).await;
        harness.session_event(SessionEvent::Established).await;
        tokio::time::sleep(INTERVAL * (round % 3)).await;

        if round % 2 == 0 {
            harness
                .session_event(SessionEvent::Closed(SessionError::BrokerDisconnect))
                .await;
        }
        harness.disconnect("flap").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    observer.abort();

    // Assert
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(harness.readings_published() > 0);
    for message in harness.transport.published() {
        let flags = message.flags.expect("gate attached");
        assert!(
            flags.contains(ReadyFlags::SESSION_UP),
            "published to {} while session was down",
            message.destination
        );
    }
}

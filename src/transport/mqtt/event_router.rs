//! Pure routing of rumqttc events onto session notifications

use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{ConnectionError, Event, StateError, TlsError};
use std::io;

use crate::error::SessionError;

/// What the driver should do with one polled event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck: the session is up
    Established,
    /// Inbound publish
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker acknowledged a QoS 1 publish
    Acknowledged { message_id: u16 },
    /// Broker sent DISCONNECT
    BrokerDisconnect,
    /// Pings, outgoing packets and other bookkeeping
    Ignored(String),
}

/// Route one polled event
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(packet) => match packet {
            Packet::ConnAck(_) => EventRoute::Established,
            Packet::Publish(publish) => EventRoute::MessageReceived {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.to_vec(),
            },
            Packet::PubAck(ack) => EventRoute::Acknowledged {
                message_id: ack.pkid,
            },
            Packet::Disconnect(_) => EventRoute::BrokerDisconnect,
            other => EventRoute::Ignored(format!("{other:?}")),
        },
        Event::Outgoing(outgoing) => EventRoute::Ignored(format!("{outgoing:?}")),
    }
}

/// Classify a poll failure
///
/// Socket, connect-timeout and TLS failures are transport errors; everything
/// the broker or the protocol state machine rejects is a protocol error.
pub fn classify_connection_error(error: ConnectionError) -> SessionError {
    match error {
        ConnectionError::Io(e) | ConnectionError::MqttState(StateError::Io(e)) => {
            SessionError::Transport(e)
        }
        ConnectionError::Timeout(elapsed) => {
            SessionError::Transport(io::Error::new(io::ErrorKind::TimedOut, elapsed))
        }
        ConnectionError::Tls(TlsError::Io(e)) => SessionError::Transport(e),
        ConnectionError::Tls(tls) => {
            SessionError::Transport(io::Error::new(io::ErrorKind::Other, tls.to_string()))
        }
        other => SessionError::Protocol(other.to_string()),
    }
}

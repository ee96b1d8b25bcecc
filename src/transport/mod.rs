//! Seams between the supervisor and the platform
//!
//! Platform callbacks are translated into [`NetworkEvent`] and
//! [`SessionEvent`] values and delivered over mpsc channels; the supervisor's
//! dispatch loops feed them into the state machines. Requests flow the other
//! way through the [`NetworkStack`] and [`SessionTransport`] traits, whose
//! methods never block: outcomes arrive later as events.

use crate::error::{LinkError, SessionError};
use std::net::IpAddr;
use tokio::sync::mpsc;

pub mod mqtt;
pub mod network;

pub use mqtt::MqttSession;
pub use network::HostNetwork;

/// Capacity of the event channels between adapters and dispatch loops
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notifications from the lower-layer network stack
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// The stack has been brought up and is ready to associate
    StartRequested,
    /// Association lost or an attempt failed
    Disconnected { reason: String },
    /// The link has a usable local address
    AddressAcquired { address: IpAddr },
}

/// Notifications from the upper-layer session transport
#[derive(Debug)]
pub enum SessionEvent {
    /// Broker accepted the session
    Established,
    /// Session ended, locally or remotely
    Closed(SessionError),
    /// Inbound message; logged only
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker acknowledged an at-least-once publish
    Acknowledged { message_id: u16 },
}

/// Delivery guarantee requested for a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    AtMostOnce,
    AtLeastOnce,
}

/// Lower-layer network control
pub trait NetworkStack: Send + Sync {
    /// Bring the stack up; it answers with [`NetworkEvent::StartRequested`]
    fn start(&self) -> Result<(), LinkError>;

    /// Request an association attempt
    fn connect(&self) -> Result<(), LinkError>;
}

/// Upper-layer session control
pub trait SessionTransport: Send + Sync {
    /// First session attempt
    fn establish(&self) -> Result<(), SessionError>;

    /// Re-establish on the existing handle after a close
    fn reconnect(&self) -> Result<(), SessionError>;

    /// Queue a message; does not wait for acknowledgment
    fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), SessionError>;
}

/// Create the channel a network adapter emits into
pub fn network_channel() -> (mpsc::Sender<NetworkEvent>, mpsc::Receiver<NetworkEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Create the channel a session adapter emits into
pub fn session_channel() -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

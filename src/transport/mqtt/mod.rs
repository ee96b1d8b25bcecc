//! MQTT session transport
//!
//! - [`connection`]: pure option and QoS construction
//! - [`event_router`]: pure mapping of rumqttc events to session routes
//! - [`client`]: the driver task and [`SessionTransport`](crate::transport::SessionTransport) impl

pub mod client;
pub mod connection;
pub mod event_router;

pub use client::MqttSession;
pub use connection::{configure_mqtt_options, parse_broker_url, qos_for, BrokerEndpoint};
pub use event_router::{route_event, EventRoute};

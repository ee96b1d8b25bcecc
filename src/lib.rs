//! dht-station
//!
//! A telemetry agent that keeps a network link and an MQTT session alive and
//! publishes DHT22 temperature/humidity readings only while both are healthy.
//!
//! # Components
//!
//! - [`gate::ConditionGate`]: wait-for-flags primitive (`LINK_UP`, `SESSION_UP`)
//! - [`link::LinkState`]: network link state machine
//! - [`session::SessionState`]: MQTT session state machine with gated reconnect
//! - [`publisher::PublishScheduler`]: periodic read-and-publish task
//! - [`supervisor::Supervisor`]: composition root and event dispatch
//!
//! # Example
//!
//! ```rust
//! use dht_station::gate::{ConditionGate, ReadyFlags};
//!
//! # tokio_test::block_on(async {
//! let gate = ConditionGate::new();
//! gate.set(ReadyFlags::LINK_UP | ReadyFlags::SESSION_UP);
//! gate.wait_all(ReadyFlags::SESSION_UP, None).await.unwrap();
//! # });
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod link;
pub mod observability;
pub mod publisher;
pub mod sensor;
pub mod session;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use config::StationConfig;
pub use error::{StationError, StationResult};
pub use gate::{ConditionGate, ReadyFlags};
pub use link::{LinkState, LinkStatus};
pub use sensor::{Reading, SensorSource};
pub use session::{SessionState, SessionStatus};
pub use supervisor::{Collaborators, StationSnapshot, Supervisor};

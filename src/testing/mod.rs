//! Testing utilities and mock implementations
//!
//! Mock collaborators for exercising the supervisor without network
//! hardware, an MQTT broker or a DHT22 sensor.

pub mod mocks;

pub use mocks::*;

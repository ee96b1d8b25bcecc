//! Temperature/humidity sensor abstraction

use crate::error::SensorError;
use std::time::Duration;

pub mod iio;

pub use iio::IioDht22;

/// One temperature/humidity sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity
    pub humidity: f32,
}

impl Reading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Temperature as published
    pub fn temperature_payload(&self) -> String {
        format_scalar(self.temperature)
    }

    /// Humidity as published
    pub fn humidity_payload(&self) -> String {
        format_scalar(self.humidity)
    }
}

/// Render a measurement with one decimal place
pub fn format_scalar(value: f32) -> String {
    format!("{value:.1}")
}

/// Synchronous sensor read
///
/// Reads may block for the duration of the sensor's bus transaction, so
/// callers on an async runtime run them on the blocking pool.
pub trait SensorSource: Send + Sync {
    fn read(&self) -> Result<Reading, SensorError>;

    /// Minimum time the sensor needs between two reads
    fn min_read_spacing(&self) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reading_payloads() {
        let reading = Reading::new(21.3, 54.7);
        assert_eq!(reading.temperature_payload(), "21.3");
        assert_eq!(reading.humidity_payload(), "54.7");
    }

    #[test]
    fn test_format_scalar_rounding() {
        assert_eq!(format_scalar(0.0), "0.0");
        assert_eq!(format_scalar(-4.3), "-4.3");
        assert_eq!(format_scalar(99.96), "100.0");
        assert_eq!(format_scalar(18.04), "18.0");
    }

    proptest! {
        #[test]
        fn prop_one_decimal_place(value in -40.0f32..80.0f32) {
            let text = format_scalar(value);
            let (_, fraction) = text.split_once('.').expect("decimal point");
            prop_assert_eq!(fraction.len(), 1);

            let parsed: f32 = text.parse().unwrap();
            prop_assert!((parsed - value).abs() <= 0.05 + f32::EPSILON * 100.0);
        }
    }
}

//! DHT22 through the Linux `dht11` IIO driver
//!
//! The kernel driver performs the single-wire bit sampling. Userspace reads
//! two sysfs attributes in milli-units; each read triggers a fresh bus
//! transaction unless the driver's two-second cache is still warm.

use super::{Reading, SensorSource};
use crate::error::SensorError;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::trace;

const TEMPERATURE_ATTR: &str = "in_temp_input";
const HUMIDITY_ATTR: &str = "in_humidityrelative_input";

/// errno the driver returns when a frame fails its checksum
const EIO: i32 = 5;

/// DHT22 operating range
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = -40.0..=80.0;
const HUMIDITY_RANGE: std::ops::RangeInclusive<f32> = 0.0..=100.0;

/// Sensor read from an IIO device directory
#[derive(Debug, Clone)]
pub struct IioDht22 {
    device: PathBuf,
    gpio_pin: u32,
    min_read_spacing: Duration,
}

impl IioDht22 {
    pub fn new(device: impl Into<PathBuf>, gpio_pin: u32, min_read_spacing: Duration) -> Self {
        Self {
            device: device.into(),
            gpio_pin,
            min_read_spacing,
        }
    }

    pub fn gpio_pin(&self) -> u32 {
        self.gpio_pin
    }

    fn read_attribute(&self, name: &str) -> Result<f32, SensorError> {
        let path = self.device.join(name);
        let raw = fs::read_to_string(&path).map_err(classify_io_error)?;
        let milli: i32 = raw.trim().parse().map_err(|_| {
            SensorError::InvalidData(format!("{}: '{}'", path.display(), raw.trim()))
        })?;
        Ok(milli as f32 / 1000.0)
    }
}

/// Map driver errors onto sensor failures
fn classify_io_error(error: io::Error) -> SensorError {
    if error.kind() == io::ErrorKind::TimedOut {
        return SensorError::Timeout;
    }
    match error.raw_os_error() {
        Some(EIO) => SensorError::Checksum,
        _ => SensorError::Io(error),
    }
}

fn check_range(
    label: &str,
    value: f32,
    range: &std::ops::RangeInclusive<f32>,
) -> Result<f32, SensorError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(SensorError::InvalidData(format!(
            "{label} {value} outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

impl SensorSource for IioDht22 {
    fn read(&self) -> Result<Reading, SensorError> {
        let temperature = self.read_attribute(TEMPERATURE_ATTR)?;
        let humidity = self.read_attribute(HUMIDITY_ATTR)?;
        trace!(gpio = self.gpio_pin, temperature, humidity, "DHT22 sample");

        Ok(Reading::new(
            check_range("temperature", temperature, &TEMPERATURE_RANGE)?,
            check_range("humidity", humidity, &HUMIDITY_RANGE)?,
        ))
    }

    fn min_read_spacing(&self) -> Duration {
        self.min_read_spacing
    }
}

//! Station configuration loaded once at startup
//!
//! The configuration is read from a TOML file, validated, and then treated as
//! immutable for the lifetime of the process. Credentials are never stored in
//! the file itself: the file names the environment variables that hold them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main station configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    pub station: StationSection,
    pub network: NetworkSection,
    pub mqtt: MqttSection,
    pub sensor: SensorSection,
}

/// Station identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationSection {
    /// Station identifier (must match [a-zA-Z0-9._-]+), used in the MQTT client id
    pub id: String,
}

/// Network link section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Network name to associate with
    pub ssid: String,
    /// Environment variable containing the network passphrase
    pub password_env: Option<String>,
    /// Address probed to decide whether the link has a usable route.
    /// Defaults to the broker host when unset.
    pub probe_addr: Option<String>,
    /// Pause the network stack takes before reporting a failed attempt
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    /// How often an up link is re-probed
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_retry_interval() -> u64 {
    5
}

fn default_probe_interval() -> u64 {
    30
}

/// MQTT session section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Destination for temperature readings
    pub temperature_topic: String,
    /// Destination for humidity readings
    pub humidity_topic: String,
    /// Destination for the one-time liveness message sent on first connect
    pub liveness_topic: Option<String>,
    /// Cooldown between the link coming back and the session reconnect
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// MQTT keep alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_keep_alive() -> u64 {
    60
}

/// Sensor section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSection {
    /// GPIO line the DHT22 data pin is wired to
    pub gpio_pin: u32,
    /// IIO device directory exposed by the kernel dht11 driver
    #[serde(default = "default_iio_device")]
    pub iio_device: PathBuf,
    /// Time between publish cycles
    #[serde(default = "default_publish_interval")]
    pub publish_interval_secs: u64,
    /// Minimum spacing the sensor needs between two reads
    #[serde(default = "default_min_read_spacing")]
    pub min_read_spacing_secs: u64,
}

fn default_iio_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

fn default_publish_interval() -> u64 {
    60
}

fn default_min_read_spacing() -> u64 {
    2
}

impl NetworkSection {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl MqttSection {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Broker login read from the named variables at call time
    ///
    /// `None` unless the username variable is named and set. A missing
    /// password variable yields an empty password.
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = std::env::var(self.username_env.as_ref()?).ok()?;
        let password = self
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Some((username, password))
    }
}

impl SensorSection {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn min_read_spacing(&self) -> Duration {
        Duration::from_secs(self.min_read_spacing_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid station ID format: {0}")]
    InvalidStationId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StationConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_station_id(&self.station.id)?;

        if self.mqtt.temperature_topic.is_empty() || self.mqtt.humidity_topic.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "temperature_topic and humidity_topic must not be empty".to_string(),
            ));
        }

        if self.mqtt.temperature_topic == self.mqtt.humidity_topic {
            return Err(ConfigError::InvalidConfig(
                "temperature_topic and humidity_topic must differ".to_string(),
            ));
        }

        // The sensor cannot be read faster than its hardware spacing allows
        if self.sensor.publish_interval_secs <= self.sensor.min_read_spacing_secs {
            return Err(ConfigError::InvalidConfig(format!(
                "publish_interval_secs ({}) must be greater than min_read_spacing_secs ({})",
                self.sensor.publish_interval_secs, self.sensor.min_read_spacing_secs
            )));
        }

        if self.network.retry_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.network.probe_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "probe_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the network passphrase; required once a variable is named
    pub fn get_network_password(&self) -> Result<Option<String>, ConfigError> {
        match &self.network.password_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[station]
id = "test-station"

[network]
ssid = "test-net"

[mqtt]
broker_url = "mqtt://localhost:1883"
temperature_topic = "station/temperature"
humidity_topic = "station/humidity"
liveness_topic = "station/online"

[sensor]
gpio_pin = 4
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate station ID format
fn validate_station_id(station_id: &str) -> Result<(), ConfigError> {
    let valid_chars = station_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if station_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidStationId(format!(
            "Station ID '{station_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[station]
id = "greenhouse-1"

[network]
ssid = "station-net"
password_env = "WIFI_PASSWORD"
probe_addr = "192.168.1.10:1883"
retry_interval_secs = 3
probe_interval_secs = 10

[mqtt]
broker_url = "mqtt://192.168.1.10:1883"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"
temperature_topic = "home/greenhouse/temperature"
humidity_topic = "home/greenhouse/humidity"
liveness_topic = "home/greenhouse/online"
reconnect_delay_secs = 7
keep_alive_secs = 30

[sensor]
gpio_pin = 17
iio_device = "/sys/bus/iio/devices/iio:device1"
publish_interval_secs = 120
min_read_spacing_secs = 2
"#;

        let config = StationConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.station.id, "greenhouse-1");
        assert_eq!(config.network.probe_addr.as_deref(), Some("192.168.1.10:1883"));
        assert_eq!(config.network.retry_interval(), Duration::from_secs(3));
        assert_eq!(config.mqtt.reconnect_delay(), Duration::from_secs(7));
        assert_eq!(config.mqtt.keep_alive(), Duration::from_secs(30));
        assert_eq!(config.sensor.gpio_pin, 17);
        assert_eq!(
            config.sensor.iio_device,
            PathBuf::from("/sys/bus/iio/devices/iio:device1")
        );
        assert_eq!(config.sensor.publish_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_defaults() {
        let config = StationConfig::test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.retry_interval_secs, 5);
        assert_eq!(config.network.probe_interval_secs, 30);
        assert_eq!(config.mqtt.reconnect_delay_secs, 5);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.sensor.publish_interval_secs, 60);
        assert_eq!(config.sensor.min_read_spacing_secs, 2);
        assert_eq!(config.sensor.iio_device, default_iio_device());
        assert_eq!(config.network.password_env, None);
    }

    #[test]
    fn test_invalid_station_id() {
        assert!(validate_station_id("invalid@station").is_err());
        assert!(validate_station_id("").is_err());
        assert!(validate_station_id("valid-station_123.test").is_ok());
    }

    #[test]
    fn test_interval_must_exceed_read_spacing() {
        let mut config = StationConfig::test_config();
        config.sensor.publish_interval_secs = 2;
        config.sensor.min_read_spacing_secs = 2;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));

        config.sensor.publish_interval_secs = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_topics_must_differ() {
        let mut config = StationConfig::test_config();
        config.mqtt.humidity_topic = config.mqtt.temperature_topic.clone();
        assert!(config.validate().is_err());

        config.mqtt.humidity_topic = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_network_intervals_rejected() {
        let mut config = StationConfig::test_config();
        config.network.retry_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = StationConfig::test_config();
        config.network.probe_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_section_fails_to_parse() {
        let toml_content = r#"
[station]
id = "test-station"
"#;
        let result = StationConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_network_password_env_missing() {
        let mut config = StationConfig::test_config();
        config.network.password_env = Some("DHT_STATION_TEST_UNSET_WIFI_PASSWORD".to_string());

        let result = config.get_network_password();
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound(_))));

        config.network.password_env = None;
        assert_eq!(config.get_network_password().unwrap(), None);
    }

    #[test]
    fn test_mqtt_credentials_from_environment() {
        let mut config = StationConfig::test_config();
        config.mqtt.username_env = Some("DHT_STATION_TEST_MQTT_USER".to_string());
        config.mqtt.password_env = Some("DHT_STATION_TEST_MQTT_PASS".to_string());
        std::env::set_var("DHT_STATION_TEST_MQTT_USER", "station");
        std::env::set_var("DHT_STATION_TEST_MQTT_PASS", "hunter2");

        assert_eq!(
            config.mqtt.credentials(),
            Some(("station".to_string(), "hunter2".to_string()))
        );

        // Password variable unset
        config.mqtt.password_env = Some("DHT_STATION_TEST_UNSET_MQTT_PASS".to_string());
        assert_eq!(
            config.mqtt.credentials(),
            Some(("station".to_string(), String::new()))
        );
    }

    #[test]
    fn test_mqtt_credentials_absent_without_username() {
        let mut config = StationConfig::test_config();
        config.mqtt.username_env = None;
        assert_eq!(config.mqtt.credentials(), None);

        config.mqtt.username_env = Some("DHT_STATION_TEST_UNSET_MQTT_USER".to_string());
        assert_eq!(config.mqtt.credentials(), None);
    }
}

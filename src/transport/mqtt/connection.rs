//! Pure MQTT option and QoS construction

use crate::config::MqttSection;
use crate::error::SessionError;
use crate::transport::Delivery;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use url::Url;

/// Broker endpoint parsed from the configured URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    /// `host:port` form, used as the default link probe target
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `mqtt://` or `mqtts://` broker URLs
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerEndpoint, SessionError> {
    let url =
        Url::parse(broker_url).map_err(|_| SessionError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(SessionError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| SessionError::InvalidBrokerUrl(broker_url.to_string()))?
        .to_string();
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerEndpoint { host, port, tls })
}

/// Client id for a station; stable across reconnects so the broker sees one client
pub fn client_id(station_id: &str) -> String {
    format!("dht-station-{station_id}")
}

/// Build MQTT options from config
pub fn configure_mqtt_options(
    station_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, SessionError> {
    let endpoint = parse_broker_url(&config.broker_url)?;
    let mut mqtt_options = MqttOptions::new(client_id(station_id), endpoint.host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some((username, password)) = config.credentials() {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}

/// Map a delivery guarantee onto an MQTT QoS level
pub fn qos_for(delivery: Delivery) -> QoS {
    match delivery {
        Delivery::AtMostOnce => QoS::AtMostOnce,
        Delivery::AtLeastOnce => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use std::time::Duration;

    #[test]
    fn test_parse_plain_url() {
        let endpoint = parse_broker_url("mqtt://broker.local:1884").unwrap();
        assert_eq!(endpoint.host, "broker.local");
        assert_eq!(endpoint.port, 1884);
        assert!(!endpoint.tls);
        assert_eq!(endpoint.socket_addr(), "broker.local:1884");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(parse_broker_url("mqtt://broker").unwrap().port, 1883);

        let secure = parse_broker_url("mqtts://broker").unwrap();
        assert_eq!(secure.port, 8883);
        assert!(secure.tls);
    }

    #[test]
    fn test_invalid_urls() {
        for url in ["not a url", "http://broker:1883", "mqtt://"] {
            let result = parse_broker_url(url);
            assert!(
                matches!(result, Err(SessionError::InvalidBrokerUrl(_))),
                "url: {url}"
            );
        }
    }

    #[test]
    fn test_configure_options() {
        let mut config = StationConfig::test_config();
        config.mqtt.broker_url = "mqtt://10.0.0.5:1883".to_string();
        config.mqtt.keep_alive_secs = 45;

        let options = configure_mqtt_options("greenhouse-1", &config.mqtt).unwrap();
        assert_eq!(options.client_id(), "dht-station-greenhouse-1");
        assert_eq!(
            options.broker_address(),
            ("10.0.0.5".to_string(), 1883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(45));
    }

    #[test]
    fn test_invalid_broker_url_rejected_by_options() {
        let mut config = StationConfig::test_config();
        config.mqtt.broker_url = "ftp://broker".to_string();

        let result = configure_mqtt_options("test-station", &config.mqtt);
        assert!(matches!(result, Err(SessionError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_for(Delivery::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(qos_for(Delivery::AtLeastOnce), QoS::AtLeastOnce);
    }
}

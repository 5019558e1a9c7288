//! Poller configuration
//!
//! Handles:
//! - Gateway transport settings (serial path/baud are opaque passthrough)
//! - Sink settings (MQTT broker + notification URL)
//! - Poll cadences (max_failures, retry_interval, value_historic_interval)
//! - Device fleet (ordered EUI-64 list) and the closed metric/endpoint map

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Closed metric schema: metric name -> protocol endpoint id.
pub type EndpointMap = BTreeMap<String, u8>;

/// Stable EUI-64 device address, `xx:xx:xx:xx:xx:xx:xx:xx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddr(String);

impl DeviceAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let octets: Vec<&str> = s.split(':').collect();
        let well_formed = octets.len() == 8
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if !well_formed {
            anyhow::bail!("invalid EUI-64 device address: {s}");
        }
        Ok(DeviceAddr(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for DeviceAddr {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DeviceAddr> for String {
    fn from(addr: DeviceAddr) -> String {
        addr.0
    }
}

impl fmt::Display for DeviceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Ordered fleet; position defines the 1-based device index.
    pub devices: Vec<DeviceAddr>,
    pub transport: TransportConfig,
    pub sink: SinkConfig,
    pub poll: PollConfig,
    pub endpoints: EndpointMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Address of the radio gateway daemon.
    pub gateway_addr: String,
    /// Serial settings forwarded verbatim to the gateway at open time.
    pub serial_path: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub notify_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Consecutive failures before a device's circuit opens.
    pub max_failures: u32,
    /// Probe cadence for open circuits, in scheduler cycles.
    pub retry_interval: u64,
    /// Historic aggregation cadence, in scheduler cycles.
    pub value_historic_interval: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            devices: [
                "74:4d:bd:ff:fe:60:1e:ba",
                "74:4d:bd:ff:fe:60:27:e5",
                "74:4d:bd:ff:fe:60:2b:2e",
                "74:4d:bd:ff:fe:60:37:1e",
                "74:4d:bd:ff:fe:60:2f:1b",
            ]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect(),
            transport: TransportConfig {
                gateway_addr: "127.0.0.1:6753".to_string(),
                serial_path: "/dev/ttyUSB0".to_string(),
                baud_rate: 115_200,
                read_timeout_ms: 5_000,
            },
            sink: SinkConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: None,
                notify_url: "http://localhost:3000/notify".to_string(),
            },
            poll: PollConfig {
                max_failures: 3,
                retry_interval: 10,
                value_historic_interval: 60,
            },
            endpoints: [
                ("temperature", 1),
                ("humidite", 2),
                ("compose_organic_volatile", 3),
                ("co2", 4),
                ("decibels", 5),
                ("particules_fines", 7),
            ]
            .iter()
            .map(|(name, ep)| (name.to_string(), *ep))
            .collect(),
        }
    }
}

impl PollerConfig {
    /// Load config from `VIGIE_CONFIG` or the OS-specific default location.
    ///
    /// A missing file means first-time setup and yields the defaults; an
    /// unreadable or invalid file is a fatal startup error.
    pub async fn load() -> Result<Self> {
        let config_path = match std::env::var("VIGIE_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::config_file_path()?,
        };

        let config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("invalid config file {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("vigie");
        path.push("poller.toml");
        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.max_failures < 1 {
            anyhow::bail!("poll.max_failures must be at least 1");
        }
        if self.poll.retry_interval < 1 {
            anyhow::bail!("poll.retry_interval must be at least 1");
        }
        if self.poll.value_historic_interval < 1 {
            anyhow::bail!("poll.value_historic_interval must be at least 1");
        }
        if self.devices.is_empty() {
            anyhow::bail!("at least one device address must be configured");
        }
        if self.endpoints.is_empty() {
            anyhow::bail!("at least one metric endpoint must be configured");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PollerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll.max_failures, 3);
        assert_eq!(config.devices.len(), 5);
        assert_eq!(config.endpoints.len(), 6);
    }

    #[test]
    fn config_file_path_points_at_vigie() {
        let path = PollerConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("vigie"));
        assert!(path.to_string_lossy().contains("poller.toml"));
    }

    #[test]
    fn device_addr_parsing() {
        let addr: DeviceAddr = "74:4D:BD:FF:FE:60:1E:BA".parse().unwrap();
        assert_eq!(addr.as_str(), "74:4d:bd:ff:fe:60:1e:ba");

        assert!("74:4d:bd".parse::<DeviceAddr>().is_err());
        assert!("74:4d:bd:ff:fe:60:1e:zz".parse::<DeviceAddr>().is_err());
        assert!("744dbdfffe601eba".parse::<DeviceAddr>().is_err());
    }

    #[test]
    fn zero_cadences_are_rejected() {
        let mut config = PollerConfig::default();
        config.poll.max_failures = 0;
        assert!(config.validate().is_err());

        let mut config = PollerConfig::default();
        config.poll.retry_interval = 0;
        assert!(config.validate().is_err());

        let mut config = PollerConfig::default();
        config.poll.value_historic_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_fleet_or_schema_is_rejected() {
        let mut config = PollerConfig::default();
        config.devices.clear();
        assert!(config.validate().is_err());

        let mut config = PollerConfig::default();
        config.endpoints.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = PollerConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: PollerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.devices, config.devices);
        assert_eq!(back.endpoints, config.endpoints);
    }
}

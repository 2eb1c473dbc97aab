//! Reader session configuration handed to the protocol client at connect time.

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("reader address is required")]
    MissingAddress,

    #[error("invalid reader address '{0}'")]
    InvalidAddress(String),

    #[error("at least one antenna must be enabled")]
    NoAntennas,

    #[error("tx power configured for antenna {0}, which is not enabled")]
    TxPowerForUnknownAntenna(u16),

    #[error("report_every_n_tags must be at least 1")]
    ZeroReportInterval,
}

/// Network location of the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderEndpoint {
    pub host: String,
    pub port: u16,
}

impl ReaderEndpoint {
    /// Parse `host` or `host:port`; a bare host gets `default_port`.
    pub fn parse(address: &str, default_port: u16) -> Result<Self, ConfigError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        let invalid = || ConfigError::InvalidAddress(address.to_string());

        // [v6]:port
        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
                None if tail.is_empty() => default_port,
                None => return Err(invalid()),
            };
            return Ok(Self {
                host: host.to_string(),
                port,
            });
        }

        match address.rsplit_once(':') {
            // bare IPv6 literal
            Some((host, _)) if host.contains(':') => Ok(Self {
                host: address.to_string(),
                port: default_port,
            }),
            Some((host, port)) if !host.is_empty() => Ok(Self {
                host: host.to_string(),
                port: port.parse::<u16>().map_err(|_| invalid())?,
            }),
            Some(_) => Err(invalid()),
            None => Ok(Self {
                host: address.to_string(),
                port: default_port,
            }),
        }
    }
}

impl fmt::Display for ReaderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Per-field inclusion toggles for tag-report content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagContentSelector {
    pub enable_ro_spec_id: bool,
    pub enable_spec_index: bool,
    pub enable_inventory_parameter_spec_id: bool,
    pub enable_antenna_id: bool,
    pub enable_channel_index: bool,
    pub enable_peak_rssi: bool,
    pub enable_first_seen_timestamp: bool,
    pub enable_last_seen_timestamp: bool,
    pub enable_tag_seen_count: bool,
    pub enable_access_spec_id: bool,
}

impl Default for TagContentSelector {
    fn default() -> Self {
        Self {
            enable_ro_spec_id: false,
            enable_spec_index: false,
            enable_inventory_parameter_spec_id: false,
            enable_antenna_id: true,
            enable_channel_index: true,
            enable_peak_rssi: true,
            enable_first_seen_timestamp: false,
            enable_last_seen_timestamp: true,
            enable_tag_seen_count: true,
            enable_access_spec_id: false,
        }
    }
}

/// Transmit power for one antenna port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntennaPower {
    pub antenna: u16,
    /// Index into the reader's transmit power table
    pub power: u16,
}

/// Inventory configuration negotiated by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Antenna ports to interrogate
    pub antennas: Vec<u16>,
    /// Transmit power per antenna; antennas without an entry use the default index
    pub tx_power: Vec<AntennaPower>,
    /// Ask the reader for a report after every N tag observations
    pub report_every_n_tags: u32,
    pub reset_on_connect: bool,
    /// Inventory is started explicitly by the operator, never on connect
    pub start_inventory_on_connect: bool,
    pub tag_content: TagContentSelector,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            antennas: defaults::DEFAULT_ANTENNAS.to_vec(),
            tx_power: Vec::new(),
            report_every_n_tags: defaults::DEFAULT_REPORT_EVERY_N_TAGS,
            reset_on_connect: true,
            start_inventory_on_connect: false,
            tag_content: TagContentSelector::default(),
        }
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.antennas.is_empty() {
            return Err(ConfigError::NoAntennas);
        }
        if let Some(entry) = self
            .tx_power
            .iter()
            .find(|entry| !self.antennas.contains(&entry.antenna))
        {
            return Err(ConfigError::TxPowerForUnknownAntenna(entry.antenna));
        }
        if self.report_every_n_tags == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        Ok(())
    }

    /// Tx power for an antenna; antennas without an entry use the default index.
    pub fn tx_power_for(&self, antenna: u16) -> u16 {
        self.tx_power
            .iter()
            .find(|entry| entry.antenna == antenna)
            .map(|entry| entry.power)
            .unwrap_or(defaults::DEFAULT_TX_POWER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            ReaderEndpoint::parse("192.168.1.100", 5084).unwrap(),
            ReaderEndpoint {
                host: "192.168.1.100".into(),
                port: 5084
            }
        );
        assert_eq!(
            ReaderEndpoint::parse(" reader.local:6000 ", 5084).unwrap(),
            ReaderEndpoint {
                host: "reader.local".into(),
                port: 6000
            }
        );
        assert_eq!(ReaderEndpoint::parse("fe80::1", 5084).unwrap().port, 5084);
        assert_eq!(
            ReaderEndpoint::parse("[::1]:7000", 5084).unwrap(),
            ReaderEndpoint {
                host: "::1".into(),
                port: 7000
            }
        );
        assert_eq!(
            ReaderEndpoint::parse("  ", 5084),
            Err(ConfigError::MissingAddress)
        );
        assert!(matches!(
            ReaderEndpoint::parse("host:notaport", 5084),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ReaderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.antennas, vec![1, 2]);
        assert_eq!(config.tx_power_for(1), 200);
        assert_eq!(config.tx_power_for(2), 200);
        assert!(!config.start_inventory_on_connect);
        assert!(config.tag_content.enable_tag_seen_count);
        assert!(!config.tag_content.enable_access_spec_id);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = ReaderConfig {
            antennas: vec![],
            ..ReaderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoAntennas));

        config.antennas = vec![1];
        config.tx_power = vec![AntennaPower {
            antenna: 2,
            power: 150,
        }];
        assert_eq!(
            config.validate(),
            Err(ConfigError::TxPowerForUnknownAntenna(2))
        );

        config.tx_power.clear();
        config.report_every_n_tags = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroReportInterval));
    }

    #[test]
    fn test_narrowed_antenna_list_without_tx_power_is_valid() {
        let config: ReaderConfig = toml::from_str("antennas = [1]").unwrap();
        config.validate().unwrap();
        assert_eq!(config.tx_power_for(1), 200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ReaderConfig = toml::from_str(
            r#"
            antennas = [1]
            report_every_n_tags = 5

            [[tx_power]]
            antenna = 1
            power = 150

            [tag_content]
            enable_first_seen_timestamp = true
            "#,
        )
        .unwrap();
        assert_eq!(config.antennas, vec![1]);
        assert_eq!(config.tx_power_for(1), 150);
        assert_eq!(config.report_every_n_tags, 5);
        assert!(config.reset_on_connect);
        assert!(config.tag_content.enable_first_seen_timestamp);
        assert!(config.tag_content.enable_peak_rssi);
    }
}

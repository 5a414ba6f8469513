//! Configuration management for devsec.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
#[cfg(feature = "toml")]
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::types::{DeviceIdentifier, DevicePolicy, EventLogVersion};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub event_log: EventLogConfig,
    pub measurement: MeasurementConfig,
    pub policy: PolicyConfig,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Record layout, fixed for the lifetime of an orchestrator
    pub version: EventLogVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Ask for a signature over the bulk measurement set
    pub request_signature: bool,
    /// Highest block index scanned by the incremental fallback
    pub max_incremental_index: u8,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            request_signature: true,
            max_incremental_index: 0xFE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Applied to every device without an override
    pub default: DevicePolicy,
    /// Overrides keyed by `"<class>:<handle>"`
    pub devices: HashMap<String, DevicePolicy>,
}

impl PolicyConfig {
    /// Parse override keys into identifiers.
    pub fn overrides(&self) -> CoreResult<HashMap<DeviceIdentifier, DevicePolicy>> {
        self.devices
            .iter()
            .map(|(key, policy)| Ok((key.parse::<DeviceIdentifier>()?, *policy)))
            .collect()
    }
}

/// Requester-side SPDM preferences handed to session factories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Bitmask of acceptable base hash algorithms (bit0 SHA-256, bit1 SHA-384, bit2 SHA-512)
    pub base_hash_algo: u32,
    /// Bitmask of acceptable measurement hash algorithms
    pub measurement_hash_algo: u32,
    /// Measurement specification bits advertised to responders
    pub measurement_specification: u8,
    /// A responder public certificate chain has been provisioned
    pub provision_cert_chain: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_hash_algo: 0b111,
            measurement_hash_algo: 0b111,
            measurement_specification: 0x01,
            provision_cert_chain: false,
        }
    }
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject values that would make the orchestrator misbehave.
    pub fn validate(&self) -> CoreResult<()> {
        if self.measurement.max_incremental_index == 0 {
            return Err(CoreError::Config(
                "measurement.max_incremental_index must be at least 1".to_string(),
            ));
        }
        if self.connection.base_hash_algo == 0 {
            return Err(CoreError::Config(
                "connection.base_hash_algo must allow at least one algorithm".to_string(),
            ));
        }
        self.policy.overrides()?;
        Ok(())
    }
}

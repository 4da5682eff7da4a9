//! Bridge configuration
//!
//! Loaded from YAML; every field has a default, so an empty document is a
//! valid configuration for the COM radio example.
//!
//! ```yaml
//! client_name: COM Example
//! library_path: C:\MSFS SDK\SimConnect SDK\lib
//! request_interval_ms: 250
//! delivery:
//!   poll: {}
//! variables:
//!   - name: COM STANDBY FREQUENCY:1
//!     unit: MHz
//! standby_event: COM_STBY_RADIO_SET
//! standby_encoding: bcd16
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::group_priority;
use crate::types::{DataType, DeliveryMode, FrequencyEncoding};
use crate::{BridgeError, Result};

/// A variable subscribed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub data_type: DataType,
}

impl VariableConfig {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self { name: name.into(), unit: unit.into(), data_type: DataType::Float64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name announced to the simulation when opening
    pub client_name: String,
    /// Directory searched for `SimConnect.dll` before the default search order
    pub library_path: Option<PathBuf>,
    /// Dispatch drain cadence
    pub receive_interval_ms: u64,
    /// Poll re-issue cadence
    pub request_interval_ms: u64,
    /// Frames decoded per drain tick before yielding to commands
    pub max_dispatch_per_tick: usize,
    /// Buffered events per subscriber
    pub event_capacity: usize,
    /// Delivery mode for the startup variables
    pub delivery: DeliveryMode,
    pub variables: Vec<VariableConfig>,
    /// Event bound at startup for standby frequency commands; `None` skips it
    pub standby_event: Option<String>,
    pub standby_encoding: FrequencyEncoding,
    pub standby_priority: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: "COM Example".to_string(),
            library_path: None,
            receive_interval_ms: 1,
            request_interval_ms: 100,
            max_dispatch_per_tick: 64,
            event_capacity: 256,
            delivery: DeliveryMode::default(),
            variables: vec![
                VariableConfig::new("COM ACTIVE FREQUENCY:1", "MHz"),
                VariableConfig::new("COM STANDBY FREQUENCY:1", "MHz"),
                VariableConfig::new("COM ACTIVE FREQUENCY:2", "MHz"),
                VariableConfig::new("COM STANDBY FREQUENCY:2", "MHz"),
            ],
            standby_event: Some("COM_STBY_RADIO_SET_HZ".to_string()),
            standby_encoding: FrequencyEncoding::RawHz,
            standby_priority: group_priority::HIGHEST,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| BridgeError::Config {
            reason: "failed to read configuration file".to_string(),
            path: Some(path.to_path_buf()),
            source: Some(Box::new(e)),
        })?;

        Self::from_yaml_str(&yaml).map_err(|e| match e {
            BridgeError::Config { reason, path: None, source } => {
                BridgeError::Config { reason, path: Some(path.to_path_buf()), source }
            }
            other => other,
        })
    }

    /// Reject values the control loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return Err(BridgeError::config_error("client_name must not be empty"));
        }
        if self.receive_interval_ms == 0 || self.request_interval_ms == 0 {
            return Err(BridgeError::config_error("intervals must be at least 1 ms"));
        }
        if self.max_dispatch_per_tick == 0 {
            return Err(BridgeError::config_error("max_dispatch_per_tick must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(BridgeError::config_error("event_capacity must be positive"));
        }
        if self.standby_event.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(BridgeError::config_error("standby_event must not be empty"));
        }

        let mut seen = HashSet::new();
        for variable in &self.variables {
            if variable.name.trim().is_empty() {
                return Err(BridgeError::config_error("variable names must not be empty"));
            }
            // two definitions for one name would report every change twice
            if !seen.insert(variable.name.as_str()) {
                return Err(BridgeError::config_error(format!(
                    "variable '{}' is listed more than once",
                    variable.name
                )));
            }
        }
        Ok(())
    }

    pub fn receive_interval(&self) -> Duration {
        Duration::from_millis(self.receive_interval_ms)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Period;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.variables.len(), 4);
        assert_eq!(config.request_interval(), Duration::from_millis(100));
        assert_eq!(config.standby_encoding, FrequencyEncoding::RawHz);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = BridgeConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn partial_yaml_overrides() {
        let yaml = r#"
client_name: Radio Panel
delivery:
  continuous:
    period: second
variables:
  - name: COM STANDBY FREQUENCY:1
    unit: MHz
standby_event: COM_STBY_RADIO_SET
standby_encoding: bcd16
"#;
        let config = BridgeConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.client_name, "Radio Panel");
        assert_eq!(config.variables, vec![VariableConfig::new("COM STANDBY FREQUENCY:1", "MHz")]);
        assert_eq!(config.standby_encoding, FrequencyEncoding::Bcd16);
        assert!(matches!(config.delivery, DeliveryMode::Continuous { period: Period::Second, .. }));
        assert_eq!(config.receive_interval_ms, 1);
    }

    #[test]
    fn duplicate_variables_are_rejected() {
        let yaml = r#"
variables:
  - { name: "COM ACTIVE FREQUENCY:1", unit: MHz }
  - { name: "COM ACTIVE FREQUENCY:1", unit: kHz }
"#;
        let err = BridgeConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn zero_values_are_rejected() {
        for yaml in [
            "receive_interval_ms: 0",
            "request_interval_ms: 0",
            "event_capacity: 0",
            "max_dispatch_per_tick: 0",
        ] {
            assert!(BridgeConfig::from_yaml_str(yaml).is_err(), "{yaml} should be rejected");
        }
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = BridgeConfig::from_yaml_str("variables: [unterminated").unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = BridgeConfig::from_file("/nonexistent/simbridge.yaml").unwrap_err();
        match err {
            BridgeError::Config { path: Some(path), .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/simbridge.yaml"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

//! Connection configuration
//!
//! Loaded from JSON. Every field has a default so a file only needs to name
//! what it changes:
//!
//! ```json
//! { "port_name": "/dev/ttyUSB0", "context": "control" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::ControlBoardProfile;
use crate::dispatch::BoardContext;
use crate::exchange::ExchangeTimeouts;
use crate::protocol::{ProtocolError, DEFAULT_BAUD_RATE};

/// Lowest baud rate accepted by [`ConnectionConfig::validate`]
pub const MIN_BAUD_RATE: u32 = 300;

/// Highest baud rate accepted by [`ConnectionConfig::validate`]
pub const MAX_BAUD_RATE: u32 = 115_200;

/// Settings for one board connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port_name: String,
    pub baud_rate: u32,
    /// Which board the harness plays
    pub context: BoardContext,
    pub timeouts: ExchangeTimeouts,
    /// Answers used in control context
    pub profile: ControlBoardProfile,
    /// Bytes requested per transport read
    pub read_chunk_size: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            context: BoardContext::default(),
            timeouts: ExchangeTimeouts::default(),
            profile: ControlBoardProfile::default(),
            read_chunk_size: 256,
            event_capacity: 256,
        }
    }
}

impl ConnectionConfig {
    /// Config for `port_name` in `context`, defaults elsewhere
    pub fn new(port_name: impl Into<String>, context: BoardContext) -> Self {
        Self {
            port_name: port_name.into(),
            context,
            ..Default::default()
        }
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::InvalidConfig(e.to_string()))
    }

    /// Read and parse a JSON file, then validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), port = %config.port_name, "loaded connection config");
        Ok(config)
    }

    /// Check the settings a port open would fail on
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.port_name.trim().is_empty() {
            return Err(ProtocolError::InvalidConfig(
                "port_name must not be empty".to_string(),
            ));
        }
        if !(MIN_BAUD_RATE..=MAX_BAUD_RATE).contains(&self.baud_rate) {
            return Err(ProtocolError::InvalidConfig(format!(
                "baud_rate {} outside {}..={}",
                self.baud_rate, MIN_BAUD_RATE, MAX_BAUD_RATE
            )));
        }
        if self.read_chunk_size == 0 {
            return Err(ProtocolError::InvalidConfig(
                "read_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ProtocolError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.context, BoardContext::Motor);
        assert_eq!(config.timeouts.status_read_ms, 3000);
        // no port yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config = ConnectionConfig::from_json_str(
            r#"{ "port_name": "COM3", "context": "control", "timeouts": { "ack_ms": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.port_name, "COM3");
        assert_eq!(config.context, BoardContext::Control);
        assert_eq!(config.timeouts.ack_ms, 250);
        assert_eq!(config.timeouts.step_ms, 1000);
        assert_eq!(config.profile.version, "VD2.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_baud_range() {
        let mut config = ConnectionConfig::new("/dev/ttyUSB0", BoardContext::Motor);
        config.baud_rate = 115_200;
        assert!(config.validate().is_ok());
        config.baud_rate = 230_400;
        assert!(matches!(
            config.validate(),
            Err(ProtocolError::InvalidConfig(_))
        ));
        config.baud_rate = 299;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            ConnectionConfig::from_json_str("{ port_name: }"),
            Err(ProtocolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "port_name": "/dev/ttyACM0", "baud_rate": 19200, "profile": {{ "version": "VD2.1.0" }} }}"#
        )
        .unwrap();

        let config = ConnectionConfig::load(file.path()).unwrap();
        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.profile.version, "VD2.1.0");
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port_name": "" }}"#).unwrap();
        assert!(ConnectionConfig::load(file.path()).is_err());

        assert!(matches!(
            ConnectionConfig::load("/nonexistent/motorbench.json"),
            Err(ProtocolError::IoError(_))
        ));
    }
}

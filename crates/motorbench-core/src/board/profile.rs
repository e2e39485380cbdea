//! Emulated control board profile

use serde::{Deserialize, Serialize};

use super::{Light, Telemetry};

/// What the emulated control board answers with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlBoardProfile {
    /// ASCII version string returned for 0x20
    pub version: String,
    /// Telemetry returned for 0x21
    pub telemetry: Telemetry,
    /// Payload of the plain acknowledgements (0x80..=0x83)
    pub ack_payload: [u8; 2],
}

impl Default for ControlBoardProfile {
    fn default() -> Self {
        Self {
            version: "VD2.0.0".to_string(),
            telemetry: Telemetry {
                status: 0x23,
                speed: 0,
                voltage: 0x37,
                temperature: 0x1C,
                power: 0,
            },
            ack_payload: [0x00, 0x01],
        }
    }
}

impl ControlBoardProfile {
    /// Switch the reported status to the code behind `light`
    pub fn show_light(&mut self, light: Light) {
        self.telemetry.status = light.status_code();
    }
}

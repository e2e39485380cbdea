//! Protocol commands
//!
//! Defines the commands understood by the control and motor boards.

use serde::{Deserialize, Serialize};

use super::{Frame, FrameBuilder, ProtocolError};

/// Lowest speed the motor board accepts in a set-speed request
pub const MIN_SPEED_RPM: u16 = 600;

/// Highest speed the motor board accepts in a set-speed request
pub const MAX_SPEED_RPM: u16 = 3450;

/// Protocol commands for board communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Stop the motor (0x80)
    Stop,

    /// Run the motor (0x81)
    Run,

    /// Set target speed (0x82)
    SetSpeed,

    /// Read speed/time gear dials (0x83)
    ReadGear,

    /// Read software version (0x20)
    ReadVersion,

    /// Read status/speed/voltage/temperature/power (0x21)
    ReadTelemetry,
}

impl Command {
    /// All commands in dispatch-table order
    pub const ALL: [Command; 6] = [
        Command::Stop,
        Command::Run,
        Command::SetSpeed,
        Command::ReadGear,
        Command::ReadVersion,
        Command::ReadTelemetry,
    ];

    /// Get the command byte
    pub fn byte(&self) -> u8 {
        match self {
            Command::Stop => 0x80,
            Command::Run => 0x81,
            Command::SetSpeed => 0x82,
            Command::ReadGear => 0x83,
            Command::ReadVersion => 0x20,
            Command::ReadTelemetry => 0x21,
        }
    }

    /// Look up a command by its byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.byte() == byte)
    }

    /// Short human readable name, used in exchange step descriptions
    pub fn name(&self) -> &'static str {
        match self {
            Command::Stop => "stop",
            Command::Run => "run",
            Command::SetSpeed => "set speed",
            Command::ReadGear => "read gear",
            Command::ReadVersion => "read version",
            Command::ReadTelemetry => "read status",
        }
    }

    /// Request frame with the idle `[0x00, 0x00]` payload
    pub fn request(&self) -> Frame {
        Frame::for_command(*self, vec![0x00, 0x00])
    }
}

/// Build a set-speed request, rejecting speeds the motor board does not accept
pub fn set_speed_request(rpm: u16) -> Result<Frame, ProtocolError> {
    if !(MIN_SPEED_RPM..=MAX_SPEED_RPM).contains(&rpm) {
        return Err(ProtocolError::SpeedOutOfRange(rpm));
    }
    Ok(FrameBuilder::from(Command::SetSpeed).u16_be(rpm).build())
}

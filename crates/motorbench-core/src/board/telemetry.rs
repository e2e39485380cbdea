//! Typed board values
//!
//! Decodes the payloads of gear and telemetry frames and maps status codes
//! onto the three indicator lights.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::protocol::{Command, Frame, FrameBuilder};

/// Payload length of a telemetry (0x21) response
pub const TELEMETRY_PAYLOAD_LEN: usize = 8;

/// Payload length of a gear (0x83) frame
pub const GEAR_PAYLOAD_LEN: usize = 2;

/// Voltage is reported in whole volts
pub const VOLTAGE_SCALE: f32 = 1.0;

/// Indicator light on the control board and motor panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Light {
    /// Stopped
    Red,
    /// Running
    Green,
    /// Fault
    Blue,
}

impl Light {
    /// Status code a board reports while showing this light
    pub fn status_code(&self) -> u8 {
        match self {
            Light::Red => 0x00,
            Light::Green => 0x0B,
            Light::Blue => 0x20,
        }
    }

    /// Color name used by the display layer
    pub fn color_name(&self) -> &'static str {
        match self {
            Light::Red => "red",
            Light::Green => "green",
            Light::Blue => "blue",
        }
    }
}

/// Motor state decoded from a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorStatus {
    /// 0x00
    Stopped,
    /// 0x0B
    Running,
    /// 0x20..=0x2B or 0x50, carrying the fault code
    Fault(u8),
    /// Any other code
    Unknown(u8),
}

impl MotorStatus {
    /// Classify a raw status code
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => MotorStatus::Stopped,
            0x0B => MotorStatus::Running,
            0x20..=0x2B | 0x50 => MotorStatus::Fault(code),
            _ => MotorStatus::Unknown(code),
        }
    }

    /// Raw status code
    pub fn code(&self) -> u8 {
        match self {
            MotorStatus::Stopped => 0x00,
            MotorStatus::Running => 0x0B,
            MotorStatus::Fault(code) | MotorStatus::Unknown(code) => *code,
        }
    }

    /// Light to show for this status; unknown codes leave the light alone
    pub fn light(&self) -> Option<Light> {
        match self {
            MotorStatus::Stopped => Some(Light::Red),
            MotorStatus::Running => Some(Light::Green),
            MotorStatus::Fault(_) => Some(Light::Blue),
            MotorStatus::Unknown(_) => None,
        }
    }

    /// Short label for status displays
    pub fn label(&self) -> &'static str {
        match self {
            MotorStatus::Stopped => "stopped",
            MotorStatus::Running => "running",
            MotorStatus::Fault(_) => "fault",
            MotorStatus::Unknown(_) => "unknown",
        }
    }
}

/// Speed and time gear dial positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearSetting {
    /// Speed gear (dial 1..=8)
    pub speed_gear: u8,
    /// Time gear (dial 1..=8)
    pub time_gear: u8,
}

impl GearSetting {
    /// Decode from a gear frame payload
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [speed_gear, time_gear, ..] => Some(Self {
                speed_gear: *speed_gear,
                time_gear: *time_gear,
            }),
            _ => None,
        }
    }
}

/// Motor telemetry block carried by a 0x21 response
///
/// Payload layout: status (1), speed (2, BE), voltage (2, BE),
/// temperature (1), power (2, BE).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Raw status code
    pub status: u8,
    /// Motor speed in rpm
    pub speed: u16,
    /// Bus voltage, raw
    pub voltage: u16,
    /// IPM temperature in °C
    pub temperature: u8,
    /// Output power in W
    pub power: u16,
}

impl Telemetry {
    /// Decode from a telemetry payload; `None` if it is too short
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < TELEMETRY_PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            status: payload[0],
            speed: BigEndian::read_u16(&payload[1..3]),
            voltage: BigEndian::read_u16(&payload[3..5]),
            temperature: payload[5],
            power: BigEndian::read_u16(&payload[6..8]),
        })
    }

    /// Encode as a telemetry payload
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_frame().payload
    }

    /// Build the telemetry response frame
    pub fn to_frame(&self) -> Frame {
        FrameBuilder::from(Command::ReadTelemetry)
            .byte(self.status)
            .u16_be(self.speed)
            .u16_be(self.voltage)
            .byte(self.temperature)
            .u16_be(self.power)
            .build()
    }

    /// Classified status
    pub fn motor_status(&self) -> MotorStatus {
        MotorStatus::from_code(self.status)
    }

    /// Voltage in volts
    pub fn volts(&self) -> f32 {
        self.voltage as f32 * VOLTAGE_SCALE
    }
}

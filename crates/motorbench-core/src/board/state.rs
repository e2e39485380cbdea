//! Display state
//!
//! The dispatcher never touches widgets. It emits [`DisplayUpdate`]s; the
//! connection folds them into a [`BoardState`] snapshot that the UI reads.
//! The snapshot is a cache of the last frames seen, not board truth.

use serde::{Deserialize, Serialize};

use super::{GearSetting, Light, MotorStatus};

/// Field of the board display an update targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayField {
    /// Motor status text
    Status,
    /// Speed in rpm
    Speed,
    /// Supply voltage
    Voltage,
    /// Temperature in degrees
    Temperature,
    /// Power draw
    Power,
    /// Firmware version string
    Version,
    /// Speed and time gear
    Gear,
    /// Indicator light
    Light,
}

/// What the status display shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusReading {
    /// Decoded from a telemetry frame
    Reported(MotorStatus),
    /// A status read is in flight
    Pending,
    /// The last status read got no answer
    TimedOut,
}

/// A single display change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayUpdate {
    /// New status reading
    Status(StatusReading),
    /// Speed in rpm
    Speed(u16),
    /// Raw supply voltage
    Voltage(u16),
    /// Temperature in degrees
    Temperature(u8),
    /// Power draw
    Power(u16),
    /// Version string from a version reply
    Version(String),
    /// Gear pair from a gear request or reply
    Gear(GearSetting),
    /// Light derived from the status code
    Light(Light),
}

impl DisplayUpdate {
    /// Field this update targets
    pub fn field(&self) -> DisplayField {
        match self {
            DisplayUpdate::Status(_) => DisplayField::Status,
            DisplayUpdate::Speed(_) => DisplayField::Speed,
            DisplayUpdate::Voltage(_) => DisplayField::Voltage,
            DisplayUpdate::Temperature(_) => DisplayField::Temperature,
            DisplayUpdate::Power(_) => DisplayField::Power,
            DisplayUpdate::Version(_) => DisplayField::Version,
            DisplayUpdate::Gear(_) => DisplayField::Gear,
            DisplayUpdate::Light(_) => DisplayField::Light,
        }
    }
}

/// Last-known values for one board
///
/// On the control board only `gear`, `light` and `status` change; the motor
/// board fills in everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardState {
    /// Last status reading, including pending and timed-out reads
    pub status: Option<StatusReading>,
    /// Last light shown
    pub light: Option<Light>,
    /// Speed in rpm
    pub speed: Option<u16>,
    /// Raw supply voltage
    pub voltage: Option<u16>,
    /// Temperature in degrees
    pub temperature: Option<u8>,
    /// Power draw
    pub power: Option<u16>,
    /// Firmware version string
    pub version: Option<String>,
    /// Speed and time gear
    pub gear: Option<GearSetting>,
}

impl BoardState {
    /// Fold a display update into the snapshot
    pub fn apply(&mut self, update: &DisplayUpdate) {
        match update {
            DisplayUpdate::Status(s) => self.status = Some(*s),
            DisplayUpdate::Speed(v) => self.speed = Some(*v),
            DisplayUpdate::Voltage(v) => self.voltage = Some(*v),
            DisplayUpdate::Temperature(v) => self.temperature = Some(*v),
            DisplayUpdate::Power(v) => self.power = Some(*v),
            DisplayUpdate::Version(v) => self.version = Some(v.clone()),
            DisplayUpdate::Gear(g) => self.gear = Some(*g),
            DisplayUpdate::Light(l) => self.light = Some(*l),
        }
    }
}

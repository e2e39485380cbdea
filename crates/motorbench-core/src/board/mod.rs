//! Board data model
//!
//! Typed views of frame payloads, the display state derived from them and
//! the profile the emulated control board answers with.

mod profile;
mod state;
mod telemetry;

pub use profile::ControlBoardProfile;
pub use state::{BoardState, DisplayField, DisplayUpdate, StatusReading};
pub use telemetry::{
    GearSetting, Light, MotorStatus, Telemetry, GEAR_PAYLOAD_LEN, TELEMETRY_PAYLOAD_LEN,
    VOLTAGE_SCALE,
};

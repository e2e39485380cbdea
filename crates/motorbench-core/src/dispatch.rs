//! Command dispatch
//!
//! Maps a validated frame onto board semantics. The same command table
//! serves two contexts:
//!
//! - [`BoardContext::Control`]: the harness stands in for the control board
//!   and answers every request with an acknowledgement frame.
//! - [`BoardContext::Motor`]: the harness talks to a real motor board and
//!   only decodes what comes back; it never answers.
//!
//! Dispatch is pure. The caller writes the response and publishes the
//! display updates.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::board::{
    ControlBoardProfile, DisplayUpdate, GearSetting, Light, MotorStatus, StatusReading,
    Telemetry, GEAR_PAYLOAD_LEN, TELEMETRY_PAYLOAD_LEN,
};
use crate::protocol::{Command, DispatchError, Frame, FrameBuilder};

/// Which side of the link the harness plays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardContext {
    /// Emulate the control board: answer requests
    Control,
    /// Drive the motor board: decode its responses
    #[default]
    Motor,
}

/// Result of dispatching one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// The frame that was dispatched
    pub frame: Frame,
    /// Frame to transmit in reply (control context only)
    pub response: Option<Frame>,
    /// Display changes derived from the frame
    pub updates: Vec<DisplayUpdate>,
}

/// Per-connection command dispatcher
#[derive(Debug, Clone)]
pub struct Dispatcher {
    context: BoardContext,
    profile: ControlBoardProfile,
}

impl Dispatcher {
    /// Create a dispatcher for the given context
    pub fn new(context: BoardContext, profile: ControlBoardProfile) -> Self {
        Self { context, profile }
    }

    /// Dispatch context
    pub fn context(&self) -> BoardContext {
        self.context
    }

    /// Profile used for control-board answers
    pub fn profile(&self) -> &ControlBoardProfile {
        &self.profile
    }

    /// Replace the control-board profile
    pub fn set_profile(&mut self, profile: ControlBoardProfile) {
        self.profile = profile;
    }

    /// Validate a raw candidate and dispatch it
    pub fn dispatch(&self, raw: &[u8]) -> Result<Dispatch, DispatchError> {
        let frame = Frame::decode(raw)?;
        self.dispatch_frame(frame)
    }

    /// Dispatch an already validated frame
    pub fn dispatch_frame(&self, frame: Frame) -> Result<Dispatch, DispatchError> {
        let command =
            Command::from_byte(frame.command).ok_or(DispatchError::UnknownCommand(frame.command))?;

        debug!(
            context = ?self.context,
            command = command.name(),
            payload_len = frame.payload.len(),
            "dispatching frame"
        );

        let (response, updates) = match self.context {
            BoardContext::Control => self.answer(command, &frame)?,
            BoardContext::Motor => (None, self.decode_motor(command, &frame)?),
        };

        Ok(Dispatch {
            frame,
            response,
            updates,
        })
    }

    /// Force the emulated control board's light and build the telemetry frame announcing it
    pub fn light_announcement(&mut self, light: Light) -> (Frame, Vec<DisplayUpdate>) {
        self.profile.show_light(light);
        let frame = self.profile.telemetry.to_frame();
        (frame, status_updates(self.profile.telemetry.status))
    }

    fn answer(
        &self,
        command: Command,
        frame: &Frame,
    ) -> Result<(Option<Frame>, Vec<DisplayUpdate>), DispatchError> {
        let ack = || {
            FrameBuilder::from(command)
                .bytes(&self.profile.ack_payload)
                .build()
        };

        let answered = match command {
            Command::ReadGear => {
                let gear = decode_gear(frame)?;
                (Some(ack()), vec![DisplayUpdate::Gear(gear)])
            }
            Command::SetSpeed | Command::Run | Command::Stop => (Some(ack()), Vec::new()),
            Command::ReadTelemetry => {
                // the motor board reports its own status in the request
                let code = *frame
                    .payload
                    .first()
                    .ok_or(DispatchError::PayloadTooShort {
                        command: frame.command,
                        needed: 1,
                        actual: 0,
                    })?;
                (
                    Some(self.profile.telemetry.to_frame()),
                    status_updates(code),
                )
            }
            Command::ReadVersion => {
                let response = FrameBuilder::from(command)
                    .bytes(self.profile.version.as_bytes())
                    .build();
                (Some(response), Vec::new())
            }
        };

        Ok(answered)
    }

    fn decode_motor(
        &self,
        command: Command,
        frame: &Frame,
    ) -> Result<Vec<DisplayUpdate>, DispatchError> {
        let updates = match command {
            Command::ReadGear => vec![DisplayUpdate::Gear(decode_gear(frame)?)],
            Command::SetSpeed | Command::Run | Command::Stop => Vec::new(),
            Command::ReadTelemetry => {
                let t = Telemetry::from_payload(&frame.payload).ok_or(
                    DispatchError::PayloadTooShort {
                        command: frame.command,
                        needed: TELEMETRY_PAYLOAD_LEN,
                        actual: frame.payload.len(),
                    },
                )?;
                let mut updates = status_updates(t.status);
                updates.extend([
                    DisplayUpdate::Speed(t.speed),
                    DisplayUpdate::Voltage(t.voltage),
                    DisplayUpdate::Temperature(t.temperature),
                    DisplayUpdate::Power(t.power),
                ]);
                updates
            }
            Command::ReadVersion => {
                let text = String::from_utf8_lossy(&frame.payload);
                let version = text.trim_end_matches('\0').trim().to_string();
                vec![DisplayUpdate::Version(version)]
            }
        };
        Ok(updates)
    }
}

fn decode_gear(frame: &Frame) -> Result<GearSetting, DispatchError> {
    GearSetting::from_payload(&frame.payload).ok_or(DispatchError::PayloadTooShort {
        command: frame.command,
        needed: GEAR_PAYLOAD_LEN,
        actual: frame.payload.len(),
    })
}

/// Status display and light for a raw status code
fn status_updates(code: u8) -> Vec<DisplayUpdate> {
    let status = MotorStatus::from_code(code);
    let mut updates = vec![DisplayUpdate::Status(StatusReading::Reported(status))];
    match status.light() {
        Some(light) => updates.push(DisplayUpdate::Light(light)),
        None => warn!("unknown status code {:#04x}", code),
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{frame::encode, to_hex, FrameError};
    use pretty_assertions::assert_eq;

    fn control() -> Dispatcher {
        Dispatcher::new(BoardContext::Control, ControlBoardProfile::default())
    }

    fn motor() -> Dispatcher {
        Dispatcher::new(BoardContext::Motor, ControlBoardProfile::default())
    }

    fn response_hex(d: &Dispatch) -> String {
        to_hex(&d.response.as_ref().expect("response").to_bytes())
    }

    #[test]
    fn test_control_acks() {
        let d = control();
        let cases = [
            (0x80, "10 02 80 00 01 93 10 03"),
            (0x81, "10 02 81 00 01 94 10 03"),
            (0x82, "10 02 82 00 01 95 10 03"),
        ];
        for (cmd, expected) in cases {
            let out = d.dispatch(&encode(cmd, &[0x02, 0x58])).unwrap();
            assert_eq!(response_hex(&out), expected);
            assert!(out.updates.is_empty());
        }
    }

    #[test]
    fn test_control_gear() {
        let out = control().dispatch(&encode(0x83, &[4, 6])).unwrap();
        assert_eq!(response_hex(&out), "10 02 83 00 01 96 10 03");
        assert_eq!(
            out.updates,
            vec![DisplayUpdate::Gear(GearSetting {
                speed_gear: 4,
                time_gear: 6
            })]
        );
    }

    #[test]
    fn test_control_telemetry() {
        let out = control().dispatch(&encode(0x21, &[0, 0])).unwrap();
        assert_eq!(
            response_hex(&out),
            "10 02 21 23 00 00 00 37 1C 00 00 A9 10 03"
        );
        assert_eq!(
            out.updates,
            vec![
                DisplayUpdate::Status(StatusReading::Reported(MotorStatus::Stopped)),
                DisplayUpdate::Light(Light::Red),
            ]
        );
    }

    #[test]
    fn test_control_light_follows_request_status() {
        let d = control();
        let cases = [
            (0x00, Some(Light::Red)),
            (0x0B, Some(Light::Green)),
            (0x25, Some(Light::Blue)),
            (0x50, Some(Light::Blue)),
            (0x07, None),
        ];
        for (code, expected) in cases {
            let out = d.dispatch(&encode(0x21, &[code, 0x00])).unwrap();
            let lights: Vec<Light> = out
                .updates
                .iter()
                .filter_map(|u| match u {
                    DisplayUpdate::Light(l) => Some(*l),
                    _ => None,
                })
                .collect();
            assert_eq!(
                lights,
                expected.into_iter().collect::<Vec<_>>(),
                "code {:#04x}",
                code
            );
            // the answer is always the profile telemetry
            assert_eq!(out.response.unwrap().payload[0], 0x23);
        }
    }

    #[test]
    fn test_control_empty_status_request() {
        assert_eq!(
            control().dispatch(&encode(0x21, &[])).unwrap_err(),
            DispatchError::PayloadTooShort {
                command: 0x21,
                needed: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn test_control_version() {
        let out = control().dispatch(&encode(0x20, &[0, 0])).unwrap();
        assert_eq!(
            response_hex(&out),
            "10 02 20 56 44 32 2E 30 2E 30 BA 10 03"
        );
    }

    #[test]
    fn test_control_bad_checksum_no_response() {
        let mut raw = encode(0x81, &[0, 0]);
        let idx = raw.len() - 3;
        raw[idx] ^= 0x01;
        assert!(matches!(
            control().dispatch(&raw),
            Err(DispatchError::Frame(FrameError::BadChecksum { .. }))
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            control().dispatch(&encode(0x42, &[0, 0])).unwrap_err(),
            DispatchError::UnknownCommand(0x42)
        );
    }

    #[test]
    fn test_motor_telemetry() {
        let raw = encode(0x21, &[0x0B, 0x00, 0x64, 0x00, 0xDC, 0x19, 0x00, 0x32]);
        let out = motor().dispatch(&raw).unwrap();
        assert_eq!(out.response, None);
        assert_eq!(
            out.updates,
            vec![
                DisplayUpdate::Status(StatusReading::Reported(MotorStatus::Running)),
                DisplayUpdate::Light(Light::Green),
                DisplayUpdate::Speed(100),
                DisplayUpdate::Voltage(220),
                DisplayUpdate::Temperature(25),
                DisplayUpdate::Power(50),
            ]
        );
    }

    #[test]
    fn test_motor_unknown_status_leaves_light() {
        let raw = encode(0x21, &[0x07, 0, 0, 0, 0, 0, 0, 0]);
        let out = motor().dispatch(&raw).unwrap();
        assert!(out
            .updates
            .iter()
            .all(|u| !matches!(u, DisplayUpdate::Light(_))));
        assert_eq!(
            out.updates[0],
            DisplayUpdate::Status(StatusReading::Reported(MotorStatus::Unknown(0x07)))
        );
    }

    #[test]
    fn test_motor_short_telemetry() {
        let err = motor().dispatch(&encode(0x21, &[0x0B, 0x00])).unwrap_err();
        assert_eq!(
            err,
            DispatchError::PayloadTooShort {
                command: 0x21,
                needed: 8,
                actual: 2
            }
        );
    }

    #[test]
    fn test_motor_version_and_acks() {
        let d = motor();
        let out = d.dispatch(&encode(0x20, b"VD2.0.0")).unwrap();
        assert_eq!(out.updates, vec![DisplayUpdate::Version("VD2.0.0".into())]);

        for cmd in [0x80, 0x81, 0x82] {
            let out = d.dispatch(&encode(cmd, &[0, 1])).unwrap();
            assert_eq!(out.response, None);
            assert!(out.updates.is_empty());
        }
    }

    #[test]
    fn test_light_announcement() {
        let mut d = control();
        let (frame, updates) = d.light_announcement(Light::Green);
        assert_eq!(frame.payload[0], 0x0B);
        assert_eq!(updates[1], DisplayUpdate::Light(Light::Green));

        // later answers carry the forced status
        let out = d.dispatch(&encode(0x21, &[0, 0])).unwrap();
        assert_eq!(out.response.unwrap().payload[0], 0x0B);
    }
}

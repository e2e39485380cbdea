//! Serial Protocol Communication
//!
//! Implements the framed command protocol spoken by the control and motor
//! boards: `10 02 | cmd | payload | checksum | 10 03`.

pub mod checksum;
pub mod commands;
mod error;
pub mod frame;
pub mod hex;
mod reassembler;
pub mod serial;

pub use checksum::checksum;
pub use commands::{set_speed_request, Command, MAX_SPEED_RPM, MIN_SPEED_RPM};
pub use error::{DispatchError, FrameError, ProtocolError};
pub use frame::{Frame, FrameBuilder};
pub use hex::{parse_hex, to_hex};
pub use reassembler::{StreamReassembler, DEFAULT_MAX_BUFFERED};
pub use serial::{list_ports, open_port, PortInfo};

/// Frame header bytes
pub const FRAME_HEADER: [u8; 2] = [0x10, 0x02];

/// Frame trailer bytes
pub const FRAME_TRAILER: [u8; 2] = [0x10, 0x03];

/// Byte the reassembler treats as the end of a frame
pub const FRAME_END_BYTE: u8 = FRAME_TRAILER[1];

/// Smallest well-formed frame: header, command, two payload bytes, checksum, trailer
pub const MIN_FRAME_LEN: usize = 8;

/// Default baud rate of both boards
pub const DEFAULT_BAUD_RATE: u32 = 9600;

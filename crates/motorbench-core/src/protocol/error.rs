//! Protocol errors

use thiserror::Error;

/// Errors surfaced to the caller of a connection operation
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Not connected to board")]
    NotConnected,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid hex input: {0}")]
    InvalidHex(String),

    #[error("Speed {0} rpm is outside the accepted range (600-3450)")]
    SpeedOutOfRange(u16),

    #[error("Exchange was cancelled before it completed")]
    ExchangeCancelled,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Reasons a frame candidate failed integrity checks
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("bad header: {0:02X} {1:02X}")]
    BadHeader(u8, u8),

    #[error("bad trailer: {0:02X} {1:02X}")]
    BadTrailer(u8, u8),

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    BadChecksum { expected: u8, actual: u8 },
}

/// Reasons a decoded frame was not dispatched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("unknown command {0:#04x}")]
    UnknownCommand(u8),

    #[error("payload too short for command {command:#04x}: need {needed}, got {actual}")]
    PayloadTooShort {
        command: u8,
        needed: usize,
        actual: usize,
    },
}

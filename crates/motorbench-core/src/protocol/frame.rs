//! Frame encoding/decoding
//!
//! Frame format (control and motor boards):
//! - 2 bytes: header `0x10 0x02`
//! - 1 byte:  command code
//! - N bytes: payload (command specific)
//! - 1 byte:  checksum, low byte of the sum of header + command + payload
//! - 2 bytes: trailer `0x10 0x03`

use byteorder::{BigEndian, ByteOrder};

use super::checksum::checksum;
use super::{Command, FrameError, FRAME_HEADER, FRAME_TRAILER, MIN_FRAME_LEN};

/// A protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command code
    pub command: u8,
    /// Command specific payload
    pub payload: Vec<u8>,
    /// Checksum over header, command and payload
    pub checksum: u8,
}

impl Frame {
    /// Create a new frame, computing its checksum
    pub fn new(command: u8, payload: Vec<u8>) -> Self {
        let checksum = frame_checksum(command, &payload);
        Self {
            command,
            payload,
            checksum,
        }
    }

    /// Create a frame for a known command
    pub fn for_command(command: Command, payload: Vec<u8>) -> Self {
        Self::new(command.byte(), payload)
    }

    /// Decode a frame from a complete candidate
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        let len = raw.len();
        if len < MIN_FRAME_LEN {
            return Err(FrameError::TooShort(len));
        }

        if raw[0..2] != FRAME_HEADER {
            return Err(FrameError::BadHeader(raw[0], raw[1]));
        }

        if raw[len - 2..] != FRAME_TRAILER {
            return Err(FrameError::BadTrailer(raw[len - 2], raw[len - 1]));
        }

        let expected = checksum(&raw[..len - 3]);
        let actual = raw[len - 3];
        if expected != actual {
            return Err(FrameError::BadChecksum { expected, actual });
        }

        Ok(Self {
            command: raw[2],
            payload: raw[3..len - 3].to_vec(),
            checksum: actual,
        })
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.extend_from_slice(&FRAME_HEADER);
        bytes.push(self.command);
        bytes.extend_from_slice(&self.payload);
        bytes.push(self.checksum);
        bytes.extend_from_slice(&FRAME_TRAILER);
        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        FRAME_HEADER.len() + 1 + self.payload.len() + 1 + FRAME_TRAILER.len()
    }

    /// Typed view of the command byte, if it is one the boards understand
    pub fn kind(&self) -> Option<Command> {
        Command::from_byte(self.command)
    }

    /// Read a big-endian u16 from the payload
    pub fn payload_u16_be(&self, offset: usize) -> Option<u16> {
        self.payload
            .get(offset..offset + 2)
            .map(BigEndian::read_u16)
    }
}

/// Encode a command and payload into wire bytes
pub fn encode(command: u8, payload: &[u8]) -> Vec<u8> {
    Frame::new(command, payload.to_vec()).to_bytes()
}

/// Decode wire bytes into a frame
pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
    Frame::decode(raw)
}

fn frame_checksum(command: u8, payload: &[u8]) -> u8 {
    checksum(&FRAME_HEADER)
        .wrapping_add(command)
        .wrapping_add(checksum(payload))
}

/// Builder for constructing frames
pub struct FrameBuilder {
    command: u8,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a frame for the given command byte
    pub fn new(command: u8) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (big-endian)
    pub fn u16_be(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Build the frame
    pub fn build(self) -> Frame {
        Frame::new(self.command, self.payload)
    }
}

impl From<Command> for FrameBuilder {
    fn from(command: Command) -> Self {
        Self::new(command.byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_set_speed() {
        // 600 rpm
        let bytes = encode(0x82, &[0x02, 0x58]);
        assert_eq!(bytes, vec![0x10, 0x02, 0x82, 0x02, 0x58, 0xEE, 0x10, 0x03]);
    }

    #[test]
    fn test_encode_version_ack() {
        let bytes = encode(0x20, b"VD2.0.0");
        assert_eq!(
            bytes,
            vec![0x10, 0x02, 0x20, 0x56, 0x44, 0x32, 0x2E, 0x30, 0x2E, 0x30, 0xBA, 0x10, 0x03]
        );
    }

    #[test]
    fn test_frame_roundtrip() {
        let original = Frame::new(0x83, vec![3, 5]);
        let decoded = Frame::decode(&original.to_bytes()).expect("Should decode successfully");
        assert_eq!(original, decoded);
        assert_eq!(decoded.kind(), Some(Command::ReadGear));
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(
            Frame::decode(&[0x10, 0x02, 0x80, 0x92, 0x10, 0x03]),
            Err(FrameError::TooShort(6))
        );
    }

    #[test]
    fn test_decode_bad_header() {
        let mut bytes = encode(0x80, &[0, 0]);
        bytes[1] = 0x05;
        assert_eq!(Frame::decode(&bytes), Err(FrameError::BadHeader(0x10, 0x05)));
    }

    #[test]
    fn test_decode_bad_trailer() {
        let mut bytes = encode(0x80, &[0, 0]);
        let last = bytes.len() - 1;
        bytes[last] = 0x04;
        assert_eq!(Frame::decode(&bytes), Err(FrameError::BadTrailer(0x10, 0x04)));
    }

    #[test]
    fn test_decode_bad_checksum() {
        let mut bytes = encode(0x81, &[0, 0]);
        let idx = bytes.len() - 3;
        bytes[idx] ^= 0xFF;
        assert_eq!(
            Frame::decode(&bytes),
            Err(FrameError::BadChecksum {
                expected: 0x93,
                actual: 0x93 ^ 0xFF
            })
        );
    }

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::from(Command::ReadTelemetry)
            .byte(0x0B)
            .u16_be(100)
            .u16_be(220)
            .byte(25)
            .u16_be(50)
            .build();

        assert_eq!(frame.payload.len(), 8);
        assert_eq!(frame.payload_u16_be(1), Some(100));
        assert_eq!(frame.payload_u16_be(3), Some(220));
        assert_eq!(frame.payload_u16_be(7), None);
        assert_eq!(frame.encoded_size(), 14);
    }
}

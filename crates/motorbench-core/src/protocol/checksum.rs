//! Additive frame checksum
//!
//! The board protocol protects each frame with the low byte of the sum of
//! every byte from the header through the last payload byte.

/// Sum all bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

//! Stream reassembly
//!
//! Serial reads arrive in arbitrary chunks: a frame may be split across
//! several reads, and several frames (or line noise) may share one read.
//! [`StreamReassembler`] accumulates the chunks and cuts out frame
//! candidates by scanning for the header start byte and the trailer end
//! byte.
//!
//! The scan is greedy and does not understand escaping: a payload or
//! checksum byte equal to `0x03` ends the candidate early. Both boards
//! behave the same way, so the behaviour is kept for wire compatibility and
//! such candidates fail [`Frame::decode`](super::Frame::decode) downstream.
//!
//! # Example
//!
//! ```
//! use motorbench_core::protocol::StreamReassembler;
//!
//! let mut reassembler = StreamReassembler::new();
//! assert!(reassembler.feed(&[0xFF, 0x10, 0x02, 0x80]).is_empty());
//!
//! let frames = reassembler.feed(&[0x00, 0x00, 0x92, 0x10, 0x03]);
//! assert_eq!(frames, vec![vec![0x10, 0x02, 0x80, 0x00, 0x00, 0x92, 0x10, 0x03]]);
//! ```

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

use super::{FRAME_END_BYTE, FRAME_HEADER};

/// Buffered length below which no judgement is made about the stream
const MIN_SCAN_LEN: usize = 4;

/// Candidates shorter than this are discarded as malformed
const MIN_CANDIDATE_LEN: usize = 4;

/// Default cap on the reassembly buffer
pub const DEFAULT_MAX_BUFFERED: usize = 4096;

/// Turns an arbitrarily chunked byte stream into frame candidates
#[derive(Debug)]
pub struct StreamReassembler {
    /// Bytes received but not yet part of an emitted candidate
    buffer: BytesMut,
    /// Buffer size at which an unterminated prefix is given up on
    max_buffered: usize,
}

impl StreamReassembler {
    /// Create a reassembler with the default buffer cap
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
    }

    /// Create a reassembler that drops its buffer once it exceeds `max_buffered` bytes
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            max_buffered: max_buffered.max(MIN_SCAN_LEN),
        }
    }

    /// Append a chunk and extract every complete candidate it finishes
    ///
    /// Candidates are returned in stream order. Anything left over is at most
    /// one unterminated frame prefix, kept for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut candidates = Vec::new();
        while let Some(candidate) = self.next_candidate() {
            candidates.push(candidate);
        }

        self.enforce_cap();
        candidates
    }

    /// Number of bytes waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any buffered partial frame
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Drop a leftover unterminated prefix that has outgrown the cap
    fn enforce_cap(&mut self) {
        if self.buffer.len() > self.max_buffered {
            warn!(
                len = self.buffer.len(),
                "reassembly buffer overflow, dropping unterminated prefix"
            );
            self.buffer.clear();
        }
    }

    fn next_candidate(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.buffer.len() < MIN_SCAN_LEN {
                return None;
            }

            let Some(start) = self.buffer.iter().position(|&b| b == FRAME_HEADER[0]) else {
                trace!(len = self.buffer.len(), "no frame start in buffer, discarding");
                self.buffer.clear();
                return None;
            };

            if start > 0 {
                trace!(skipped = start, "discarding bytes before frame start");
                self.buffer.advance(start);
            }

            if self.buffer.len() > 1 && self.buffer[1] != FRAME_HEADER[1] {
                self.buffer.advance(1);
                continue;
            }

            let end = self
                .buffer
                .iter()
                .skip(1)
                .position(|&b| b == FRAME_END_BYTE)
                .map(|i| i + 1)?;

            let candidate = self.buffer.split_to(end + 1);
            if candidate.len() < MIN_CANDIDATE_LEN {
                trace!(len = candidate.len(), "discarding runt candidate");
                continue;
            }

            return Some(candidate.to_vec());
        }
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamReassembler {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let incoming = src.split();
            self.buffer.extend_from_slice(&incoming);
        }
        let candidate = self.next_candidate();
        if candidate.is_none() {
            self.enforce_cap();
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::encode;
    use pretty_assertions::assert_eq;

    fn telemetry_frame() -> Vec<u8> {
        encode(0x21, &[0x0B, 0x00, 0x64, 0x00, 0xDC, 0x19, 0x00, 0x32])
    }

    #[test]
    fn test_single_frame() {
        let frame = encode(0x80, &[0, 0]);
        let mut r = StreamReassembler::new();
        assert_eq!(r.feed(&frame), vec![frame]);
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn test_every_split_point() {
        let frame = telemetry_frame();
        for split in 1..frame.len() {
            let mut r = StreamReassembler::new();
            let mut out = r.feed(&frame[..split]);
            out.extend(r.feed(&frame[split..]));
            assert_eq!(out, vec![frame.clone()], "split at {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let frame = telemetry_frame();
        let mut r = StreamReassembler::new();
        let mut out = Vec::new();
        for b in &frame {
            out.extend(r.feed(std::slice::from_ref(b)));
        }
        assert_eq!(out, vec![frame]);
    }

    #[test]
    fn test_garbage_prefix() {
        let frame = encode(0x81, &[0, 1]);
        let mut input = vec![0xFF, 0xFF];
        input.extend_from_slice(&frame);
        let mut r = StreamReassembler::new();
        assert_eq!(r.feed(&input), vec![frame]);
    }

    #[test]
    fn test_false_start_byte() {
        // 0x10 not followed by 0x02 is skipped
        let frame = encode(0x80, &[0, 1]);
        let mut input = vec![0x10, 0x55, 0x10, 0x10];
        input.extend_from_slice(&frame);
        let mut r = StreamReassembler::new();
        assert_eq!(r.feed(&input), vec![frame]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let a = encode(0x80, &[0, 1]);
        let b = encode(0x83, &[0, 1]);
        let mut input = a.clone();
        input.extend_from_slice(&b);
        let mut r = StreamReassembler::new();
        assert_eq!(r.feed(&input), vec![a, b]);
    }

    #[test]
    fn test_no_start_clears_buffer() {
        let mut r = StreamReassembler::new();
        assert!(r.feed(&[0x01, 0x02, 0x03, 0x04, 0x05]).is_empty());
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn test_short_input_waits() {
        let mut r = StreamReassembler::new();
        assert!(r.feed(&[0xAA, 0xBB, 0xCC]).is_empty());
        assert_eq!(r.buffered(), 3);
    }

    #[test]
    fn test_runt_candidate_discarded() {
        let frame = encode(0x80, &[0, 1]);
        let mut input = vec![0x10, 0x02, 0x03];
        input.extend_from_slice(&frame);
        let mut r = StreamReassembler::new();
        assert_eq!(r.feed(&input), vec![frame]);
    }

    #[test]
    fn test_payload_end_byte_truncates() {
        // a 0x03 inside the payload cuts the candidate short
        let frame = encode(0x82, &[0x03, 0x20]);
        let mut r = StreamReassembler::new();
        let out = r.feed(&frame);
        assert_eq!(out[0], vec![0x10, 0x02, 0x82, 0x03]);
    }

    #[test]
    fn test_overflow_drops_prefix() {
        let mut r = StreamReassembler::with_max_buffered(16);
        let mut input = vec![0x10, 0x02];
        input.extend(std::iter::repeat(0x55).take(32));
        assert!(r.feed(&input).is_empty());
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn test_decoder_respects_cap() {
        let mut r = StreamReassembler::with_max_buffered(16);
        let mut src = BytesMut::new();
        src.extend_from_slice(&[0x10, 0x02]);
        src.extend_from_slice(&[0x55; 32]);
        assert_eq!(r.decode(&mut src).unwrap(), None);
        assert_eq!(r.buffered(), 0);

        // the stream recovers on the next frame
        let frame = encode(0x80, &[0, 1]);
        src.extend_from_slice(&frame);
        assert_eq!(r.decode(&mut src).unwrap(), Some(frame));
    }

    #[test]
    fn test_decoder_impl() {
        let a = encode(0x80, &[0, 1]);
        let b = encode(0x81, &[0, 1]);
        let mut src = BytesMut::new();
        src.extend_from_slice(&a);
        src.extend_from_slice(&b[..3]);

        let mut r = StreamReassembler::new();
        assert_eq!(r.decode(&mut src).unwrap(), Some(a));
        assert!(src.is_empty());
        assert_eq!(r.decode(&mut src).unwrap(), None);

        src.extend_from_slice(&b[3..]);
        assert_eq!(r.decode(&mut src).unwrap(), Some(b));
    }
}

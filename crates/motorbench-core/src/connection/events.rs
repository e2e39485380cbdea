//! Events published by a board connection

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::board::DisplayUpdate;
use crate::exchange::ExchangeReport;
use crate::protocol::{to_hex, Frame, FrameError};

/// Something that happened on the link
#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// A candidate passed every integrity check
    FrameDecoded(Frame),
    /// A candidate was dropped
    FrameRejected { bytes: Vec<u8>, error: FrameError },
    /// A display field changed
    Display(DisplayUpdate),
    /// Bytes crossed the link
    Traffic(TrafficRecord),
    /// An exchange ran to completion
    ExchangeFinished(ExchangeReport),
    /// The I/O task stopped
    Disconnected,
}

/// Direction of a traffic record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Read from the peer board
    Received,
    /// Written to the peer board
    Sent,
}

impl Direction {
    /// Label used in the traffic log
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Received => "Rec",
            Direction::Sent => "Ack",
        }
    }
}

/// Timestamped bytes for the traffic log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficRecord {
    /// Local time the bytes were read or written
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    /// Frame candidate or raw write, as on the wire
    pub bytes: Vec<u8>,
}

impl TrafficRecord {
    /// Record a received candidate stamped now
    pub fn received(bytes: Vec<u8>) -> Self {
        Self::now(Direction::Received, bytes)
    }

    /// Record a write stamped now
    pub fn sent(bytes: Vec<u8>) -> Self {
        Self::now(Direction::Sent, bytes)
    }

    fn now(direction: Direction, bytes: Vec<u8>) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            bytes,
        }
    }
}

impl fmt::Display for TrafficRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.direction.label(),
            to_hex(&self.bytes)
        )
    }
}

/// Link counters, updated by the I/O task
#[derive(Debug, Default)]
pub struct LinkStats {
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
    tx_frames: AtomicU64,
    rx_frames: AtomicU64,
    rejected: AtomicU64,
}

impl LinkStats {
    pub(crate) fn record_tx(&self, bytes: usize) {
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rx_bytes(&self, bytes: usize) {
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rx_frame(&self) {
        self.rx_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatsSnapshot {
    /// Bytes written
    pub tx_bytes: u64,
    /// Bytes read, framed or not
    pub rx_bytes: u64,
    /// Successful writes
    pub tx_frames: u64,
    /// Frames that passed validation
    pub rx_frames: u64,
    /// Candidates dropped by validation
    pub rejected: u64,
}

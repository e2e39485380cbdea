//! # MotorBench Core Library
//!
//! Bench-test harness for a motor drive made of a control board and a motor
//! board that talk over a serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The framed serial protocol (`10 02 | cmd | payload | checksum | 10 03`)
//! - Stream reassembly of frames split or merged by the serial driver
//! - Command dispatch for both ends of the link
//! - Sequenced command/response exchanges with per-step timeouts
//! - An async connection that drives all of the above on one task
//!
//! ## Board contexts
//!
//! - Control: the harness emulates the control board and answers requests
//! - Motor: the harness drives a real motor board and decodes its replies
//!
//! ## Example
//!
//! ```rust,ignore
//! use motorbench_core::prelude::*;
//!
//! let config = ConnectionConfig::load("motor.json")?;
//! let conn = BoardConnection::open(&config)?;
//!
//! let report = conn.start_motor(1500).await?.wait().await?;
//! if report.final_step_timed_out() {
//!     println!("motor board did not report a status");
//! }
//! println!("status: {:?}", conn.state().status);
//! ```

pub mod board;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod exchange;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::{
        BoardState, ControlBoardProfile, DisplayField, DisplayUpdate, GearSetting, Light,
        MotorStatus, StatusReading, Telemetry,
    };
    pub use crate::config::ConnectionConfig;
    pub use crate::connection::{BoardConnection, BoardEvent, ExchangeHandle, TrafficRecord};
    pub use crate::dispatch::{BoardContext, Dispatcher};
    pub use crate::exchange::{ExchangeReport, ExchangeStep, ExchangeTimeouts, SequencedExchange};
    pub use crate::protocol::{Command, Frame, FrameBuilder, ProtocolError, StreamReassembler};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Board connection
//!
//! [`BoardConnection`] is the handle the UI holds for one serial link. The
//! work happens on a spawned I/O task; the handle only sends it requests and
//! reads what it publishes:
//!
//! - [`BoardConnection::subscribe`] for [`BoardEvent`]s (frames, display
//!   updates, traffic log lines, finished exchanges)
//! - [`BoardConnection::state`] for the latest [`BoardState`] snapshot
//! - [`BoardConnection::stats`] for link counters
//!
//! ```rust,ignore
//! use motorbench_core::prelude::*;
//!
//! let config = ConnectionConfig::new("/dev/ttyUSB0", BoardContext::Motor);
//! let conn = BoardConnection::open(&config)?;
//! let report = conn.start_motor(1200).await?.wait().await?;
//! println!("{:?}", conn.state().status);
//! ```

mod events;
mod io;

pub use events::{BoardEvent, Direction, LinkStats, LinkStatsSnapshot, TrafficRecord};

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::board::{BoardState, Light};
use crate::config::ConnectionConfig;
use crate::dispatch::{BoardContext, Dispatcher};
use crate::exchange::{plans, ExchangeReport, ExchangeStep, ExchangeTimeouts, SequencedExchange};
use crate::protocol::serial::open_port;
use crate::protocol::{Command, Frame, ProtocolError};

use self::io::{IoTask, Request};

/// Depth of the request channel
const REQUEST_QUEUE_DEPTH: usize = 32;

/// Waits for an exchange started with [`BoardConnection::run_exchange`]
#[derive(Debug)]
pub struct ExchangeHandle {
    reply: oneshot::Receiver<ExchangeReport>,
}

impl ExchangeHandle {
    /// Wait for the exchange to finish.
    ///
    /// Fails with [`ProtocolError::ExchangeCancelled`] if a newer exchange
    /// replaced this one or the connection closed first.
    pub async fn wait(self) -> Result<ExchangeReport, ProtocolError> {
        self.reply
            .await
            .map_err(|_| ProtocolError::ExchangeCancelled)
    }
}

/// Handle to one board link
#[derive(Debug)]
pub struct BoardConnection {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<BoardEvent>,
    state: watch::Receiver<BoardState>,
    stats: Arc<LinkStats>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    context: BoardContext,
    timeouts: ExchangeTimeouts,
}

impl BoardConnection {
    /// Open the configured serial port and start the I/O task
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &ConnectionConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let port = open_port(&config.port_name, config.baud_rate)?;
        info!(
            port = %config.port_name,
            baud = config.baud_rate,
            context = ?config.context,
            "connected"
        );
        Ok(Self::attach(port, config))
    }

    /// Start the I/O task on an already open transport
    pub fn attach<T>(io: T, config: &ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(BoardState::default());
        let stats = Arc::new(LinkStats::default());
        let cancel = CancellationToken::new();

        let task = IoTask::new(
            reader,
            writer,
            request_rx,
            cancel.clone(),
            events.clone(),
            state_tx,
            stats.clone(),
            Dispatcher::new(config.context, config.profile.clone()),
            config.read_chunk_size,
        );
        let task = tokio::spawn(task.run());

        Self {
            requests: request_tx,
            events,
            state: state_rx,
            stats,
            cancel,
            task: Some(task),
            context: config.context,
            timeouts: config.timeouts,
        }
    }

    /// Which board this end of the link plays
    pub fn context(&self) -> BoardContext {
        self.context
    }

    /// Timeouts used by the plan helpers
    pub fn timeouts(&self) -> &ExchangeTimeouts {
        &self.timeouts
    }

    /// Receive events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Latest display snapshot
    pub fn state(&self) -> BoardState {
        self.state.borrow().clone()
    }

    /// Watch the display snapshot for changes
    pub fn watch_state(&self) -> watch::Receiver<BoardState> {
        self.state.clone()
    }

    /// Current link counters
    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the I/O task has stopped or been asked to stop
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.requests.is_closed()
    }

    /// Encode and send one frame
    pub async fn send_command(
        &self,
        command: Command,
        payload: Vec<u8>,
    ) -> Result<(), ProtocolError> {
        self.send_frame(&Frame::for_command(command, payload)).await
    }

    /// Send an already built frame
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), ProtocolError> {
        self.send_raw(frame.to_bytes()).await
    }

    /// Send bytes as-is, framed or not
    pub async fn send_raw(&self, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Send { bytes, reply }).await?;
        rx.await.map_err(|_| ProtocolError::NotConnected)?
    }

    /// Start an exchange, cancelling any exchange still running
    pub async fn run_exchange(
        &self,
        steps: Vec<ExchangeStep>,
    ) -> Result<ExchangeHandle, ProtocolError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Exchange {
            exchange: SequencedExchange::new(steps),
            reply,
        })
        .await?;
        Ok(ExchangeHandle { reply: rx })
    }

    /// Force the emulated control board's light and send the matching telemetry
    pub async fn announce_light(&self, light: Light) -> Result<(), ProtocolError> {
        if self.context != BoardContext::Control {
            return Err(ProtocolError::InvalidConfig(
                "light announcements need the control context".to_string(),
            ));
        }
        let (reply, rx) = oneshot::channel();
        self.request(Request::AnnounceLight { light, reply }).await?;
        rx.await.map_err(|_| ProtocolError::NotConnected)?
    }

    /// Set the speed, run, then read the status
    pub async fn start_motor(&self, rpm: u16) -> Result<ExchangeHandle, ProtocolError> {
        self.run_exchange(plans::start_motor(rpm, &self.timeouts)?).await
    }

    /// Stop, then read the status
    pub async fn stop_motor(&self) -> Result<ExchangeHandle, ProtocolError> {
        self.run_exchange(plans::stop_motor(&self.timeouts)).await
    }

    /// Change the speed of a running motor, then read the status
    pub async fn set_speed(&self, rpm: u16) -> Result<ExchangeHandle, ProtocolError> {
        self.run_exchange(plans::set_speed(rpm, &self.timeouts)?).await
    }

    /// Read the motor board's telemetry
    pub async fn read_status(&self) -> Result<ExchangeHandle, ProtocolError> {
        self.run_exchange(plans::read_status(&self.timeouts)).await
    }

    /// Read the motor board's firmware version
    pub async fn read_version(&self) -> Result<ExchangeHandle, ProtocolError> {
        self.run_exchange(plans::read_version(&self.timeouts)).await
    }

    /// Read the motor board's gear setting
    pub async fn read_gear(&self) -> Result<ExchangeHandle, ProtocolError> {
        self.run_exchange(plans::read_gear(&self.timeouts)).await
    }

    /// Stop the I/O task and wait for it to exit.
    ///
    /// A running exchange is dropped; its waiter sees
    /// [`ProtocolError::ExchangeCancelled`].
    pub async fn close(mut self) -> Result<(), ProtocolError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| ProtocolError::SerialError(format!("I/O task failed: {}", e)))?;
        }
        info!("connection closed");
        Ok(())
    }

    async fn request(&self, request: Request) -> Result<(), ProtocolError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ProtocolError::NotConnected)
    }
}

impl Drop for BoardConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

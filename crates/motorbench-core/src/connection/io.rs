//! I/O task
//!
//! One task per connection owns the transport, the reassembler, the
//! dispatcher and the active exchange. Callers talk to it over an mpsc
//! request channel; it talks back over the event broadcast, the state watch
//! and per-request oneshot replies.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::events::{BoardEvent, LinkStats, TrafficRecord};
use crate::board::{BoardState, DisplayUpdate, Light, StatusReading};
use crate::dispatch::{BoardContext, Dispatcher};
use crate::exchange::{ExchangeAction, ExchangeReport, SequencedExchange};
use crate::protocol::{to_hex, Command, Frame, ProtocolError, StreamReassembler};

/// Requests from a [`super::BoardConnection`] to its I/O task
pub(crate) enum Request {
    /// Write raw bytes
    Send {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<(), ProtocolError>>,
    },
    /// Replace the active exchange with a new one
    Exchange {
        exchange: SequencedExchange,
        reply: oneshot::Sender<ExchangeReport>,
    },
    /// Force the emulated control board's light
    AnnounceLight {
        light: Light,
        reply: oneshot::Sender<Result<(), ProtocolError>>,
    },
}

struct ActiveExchange {
    exchange: SequencedExchange,
    deadline: Instant,
    reply: oneshot::Sender<ExchangeReport>,
}

pub(crate) struct IoTask<T> {
    reader: ReadHalf<T>,
    writer: WriteHalf<T>,
    requests: mpsc::Receiver<Request>,
    cancel: CancellationToken,
    events: broadcast::Sender<BoardEvent>,
    state: watch::Sender<BoardState>,
    stats: Arc<LinkStats>,
    reassembler: StreamReassembler,
    dispatcher: Dispatcher,
    read_chunk_size: usize,
    active: Option<ActiveExchange>,
}

impl<T> IoTask<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: ReadHalf<T>,
        writer: WriteHalf<T>,
        requests: mpsc::Receiver<Request>,
        cancel: CancellationToken,
        events: broadcast::Sender<BoardEvent>,
        state: watch::Sender<BoardState>,
        stats: Arc<LinkStats>,
        dispatcher: Dispatcher,
        read_chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            writer,
            requests,
            cancel,
            events,
            state,
            stats,
            reassembler: StreamReassembler::new(),
            dispatcher,
            read_chunk_size,
            active: None,
        }
    }

    /// Run until cancelled, the transport closes, or every handle is gone.
    ///
    /// Priority order: cancellation, caller requests, transport reads, then
    /// the active step deadline. A failed write only fails the operation
    /// that issued it; a failed read ends the task.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; self.read_chunk_size.max(1)];

        loop {
            let deadline = self.active.as_ref().map(|a| a.deadline);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("I/O task cancelled");
                    break;
                }

                req = self.requests.recv() => match req {
                    Some(req) => self.handle_request(req).await,
                    None => {
                        debug!("request channel closed, exiting I/O task");
                        break;
                    }
                },

                read = self.reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("transport closed by peer");
                        break;
                    }
                    Ok(n) => self.on_bytes(&buf[..n]).await,
                    Err(e) => {
                        error!("transport read failed: {}", e);
                        break;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_deadline().await
                }
            }
        }

        if let Some(active) = self.active.take() {
            debug!(
                step = active.exchange.cursor(),
                "dropping unfinished exchange"
            );
        }
        let _ = self.events.send(BoardEvent::Disconnected);
    }

    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Send { bytes, reply } => {
                let result = self.write_bytes(bytes).await;
                reply_with(reply, result);
            }
            Request::Exchange { exchange, reply } => self.start_exchange(exchange, reply).await,
            Request::AnnounceLight { light, reply } => {
                let (frame, updates) = self.dispatcher.light_announcement(light);
                info!(light = light.color_name(), "announcing light");
                self.publish_updates(updates);
                let result = self.write_bytes(frame.to_bytes()).await;
                reply_with(reply, result);
            }
        }
    }

    async fn start_exchange(
        &mut self,
        mut exchange: SequencedExchange,
        reply: oneshot::Sender<ExchangeReport>,
    ) {
        if let Some(previous) = self.active.take() {
            info!(
                step = previous.exchange.cursor(),
                "cancelling previous exchange"
            );
        }

        debug!(steps = exchange.len(), "starting exchange");
        let action = exchange.start();
        self.active = Some(ActiveExchange {
            exchange,
            deadline: Instant::now(),
            reply,
        });
        self.apply_action(action).await
    }

    async fn on_bytes(&mut self, chunk: &[u8]) {
        trace!(len = chunk.len(), data = %to_hex(chunk), "rx");
        self.stats.record_rx_bytes(chunk.len());

        for candidate in self.reassembler.feed(chunk) {
            self.on_candidate(candidate).await;
        }
    }

    async fn on_candidate(&mut self, raw: Vec<u8>) {
        self.publish(BoardEvent::Traffic(TrafficRecord::received(raw.clone())));

        let frame = match Frame::decode(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(data = %to_hex(&raw), "dropping frame: {}", e);
                self.stats.record_rejected();
                self.publish(BoardEvent::FrameRejected {
                    bytes: raw,
                    error: e,
                });
                return;
            }
        };

        self.stats.record_rx_frame();
        self.publish(BoardEvent::FrameDecoded(frame.clone()));

        match self.dispatcher.dispatch_frame(frame.clone()) {
            Ok(dispatch) => {
                self.publish_updates(dispatch.updates);
                if let Some(response) = dispatch.response {
                    if let Err(e) = self.write_bytes(response.to_bytes()).await {
                        warn!(command = frame.command, "answer not sent: {}", e);
                    }
                }
            }
            Err(e) => warn!(command = frame.command, "frame not dispatched: {}", e),
        }

        let action = match self.active.as_mut() {
            Some(active) => active.exchange.on_response(&frame),
            None => None,
        };
        if let Some(action) = action {
            self.apply_action(action).await;
        }
    }

    async fn on_deadline(&mut self) {
        let action = match self.active.as_mut() {
            Some(active) => {
                if let Some(step) = active.exchange.current_step() {
                    warn!(step = %step.description, "no response before timeout, moving on");
                }
                active.exchange.on_timeout()
            }
            None => None,
        };
        if let Some(action) = action {
            self.apply_action(action).await;
        }
    }

    async fn apply_action(&mut self, action: ExchangeAction) {
        match action {
            ExchangeAction::Send { request, timeout } => {
                if let Err(e) = self.write_bytes(request.to_bytes()).await {
                    // the waiter sees the dropped reply as a cancellation
                    warn!(command = request.command, "exchange request not sent: {}", e);
                    self.active = None;
                    return;
                }
                if self.motor_status_read(request.command) {
                    self.publish_updates(vec![DisplayUpdate::Status(StatusReading::Pending)]);
                }
                if let Some(active) = self.active.as_mut() {
                    active.deadline = Instant::now() + timeout;
                }
            }
            ExchangeAction::Complete(report) => {
                debug!(
                    steps = report.steps.len(),
                    timed_out = report.timed_out_count(),
                    "exchange complete"
                );
                let status_read = Command::ReadTelemetry.byte();
                if report.final_step_timed_out_on(status_read)
                    && self.motor_status_read(status_read)
                {
                    self.publish_updates(vec![DisplayUpdate::Status(StatusReading::TimedOut)]);
                }
                self.publish(BoardEvent::ExchangeFinished(report.clone()));
                if let Some(active) = self.active.take() {
                    let _ = active.reply.send(report);
                }
            }
        }
    }

    /// Status reads drive the status field only when talking to a motor board
    fn motor_status_read(&self, command: u8) -> bool {
        self.dispatcher.context() == BoardContext::Motor
            && command == Command::ReadTelemetry.byte()
    }

    async fn write_bytes(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        trace!(len = bytes.len(), data = %to_hex(&bytes), "tx");
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.stats.record_tx(bytes.len());
        self.publish(BoardEvent::Traffic(TrafficRecord::sent(bytes)));
        Ok(())
    }

    fn publish_updates(&mut self, updates: Vec<DisplayUpdate>) {
        for update in updates {
            self.state.send_modify(|state| state.apply(&update));
            self.publish(BoardEvent::Display(update));
        }
    }

    fn publish(&self, event: BoardEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

fn reply_with(reply: oneshot::Sender<Result<(), ProtocolError>>, result: io::Result<()>) {
    let outcome = result.map_err(|e| {
        warn!("write failed: {}", e);
        ProtocolError::SerialError(e.to_string())
    });
    let _ = reply.send(outcome);
}

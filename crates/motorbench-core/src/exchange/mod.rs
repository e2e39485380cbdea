//! Sequenced command/response exchanges
//!
//! A user operation such as "start motor" is a short script: set the speed,
//! wait for the ack, send run, wait for the ack, read the status. A
//! [`SequencedExchange`] holds that script as a step table plus a cursor.
//!
//! The state machine has no timers of its own. The connection that drives
//! it arms a deadline for every [`ExchangeAction::Send`] it is handed and
//! calls [`SequencedExchange::on_timeout`] when the deadline passes. A
//! timed-out step is recorded and skipped; the exchange never retries and
//! always runs to completion.

pub mod plans;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{to_hex, Frame};

/// Callback invoked with the response that resolved a step
pub type ResponseHandler = Box<dyn FnMut(&Frame) + Send>;

/// Timeouts used by the canned exchange plans, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeTimeouts {
    /// Quick single-frame replies (version, gear)
    pub ack_ms: u64,
    /// Acks to motion commands (set speed, run, stop)
    pub step_ms: u64,
    /// Final status read
    pub status_read_ms: u64,
}

impl Default for ExchangeTimeouts {
    fn default() -> Self {
        Self {
            ack_ms: 100,
            step_ms: 1000,
            status_read_ms: 3000,
        }
    }
}

impl ExchangeTimeouts {
    /// Wait for a version or gear reply
    pub fn ack(&self) -> Duration {
        Duration::from_millis(self.ack_ms)
    }

    /// Wait for a motion command ack
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    /// Wait for the closing status read
    pub fn status_read(&self) -> Duration {
        Duration::from_millis(self.status_read_ms)
    }
}

/// One request and the response that resolves it
pub struct ExchangeStep {
    /// Frame sent when the step becomes current
    pub request: Frame,
    /// Command byte of the response that resolves the step
    pub expects: u8,
    /// How long to wait before moving on
    pub timeout: Duration,
    /// Label for logs and reports
    pub description: String,
    handler: Option<ResponseHandler>,
}

impl ExchangeStep {
    /// Step resolved by a response carrying the request's command byte
    pub fn new(request: Frame, timeout: Duration) -> Self {
        let description = match request.kind() {
            Some(command) => command.name().to_string(),
            None => format!("command {:#04x}", request.command),
        };
        Self {
            expects: request.command,
            request,
            timeout,
            description,
            handler: None,
        }
    }

    /// Set the step label
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Resolve on a different response command byte
    pub fn expecting(mut self, command: u8) -> Self {
        self.expects = command;
        self
    }

    /// Run `handler` with the matching response
    pub fn on_response(mut self, handler: impl FnMut(&Frame) + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for ExchangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeStep")
            .field("request", &to_hex(&self.request.to_bytes()))
            .field("expects", &format_args!("{:#04x}", self.expects))
            .field("timeout", &self.timeout)
            .field("description", &self.description)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// How a step was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A matching response arrived
    Responded(Frame),
    /// The step's timeout passed first
    TimedOut,
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Label of the step
    pub description: String,
    /// Command byte of the step's request
    pub command: u8,
    pub outcome: StepOutcome,
}

/// Outcome of a whole exchange, in step order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    /// One entry per step, including skipped ones
    pub steps: Vec<StepReport>,
}

impl ExchangeReport {
    /// Whether the last step ran out of time
    pub fn final_step_timed_out(&self) -> bool {
        matches!(
            self.steps.last(),
            Some(StepReport {
                outcome: StepOutcome::TimedOut,
                ..
            })
        )
    }

    /// Whether the last step was a `command` request that ran out of time
    pub fn final_step_timed_out_on(&self, command: u8) -> bool {
        matches!(
            self.steps.last(),
            Some(StepReport {
                command: c,
                outcome: StepOutcome::TimedOut,
                ..
            }) if *c == command
        )
    }

    /// Number of steps that timed out
    pub fn timed_out_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::TimedOut)
            .count()
    }

    /// Response that resolved the last step, if any
    pub fn final_response(&self) -> Option<&Frame> {
        match self.steps.last() {
            Some(StepReport {
                outcome: StepOutcome::Responded(frame),
                ..
            }) => Some(frame),
            _ => None,
        }
    }
}

/// What the driver must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeAction {
    /// Transmit `request` and arm a deadline `timeout` from now
    Send { request: Frame, timeout: Duration },
    /// Every step is resolved
    Complete(ExchangeReport),
}

/// Step table plus cursor
#[derive(Debug)]
pub struct SequencedExchange {
    steps: Vec<ExchangeStep>,
    cursor: usize,
    started: bool,
    report: ExchangeReport,
}

impl SequencedExchange {
    /// Exchange over `steps`; nothing is sent until [`start`](Self::start)
    pub fn new(steps: Vec<ExchangeStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            started: false,
            report: ExchangeReport::default(),
        }
    }

    /// Reset to the first step and return its request
    pub fn start(&mut self) -> ExchangeAction {
        self.cursor = 0;
        self.started = true;
        self.report = ExchangeReport::default();
        self.current_action()
    }

    /// Feed a decoded frame; returns the next action if it resolved the current step
    pub fn on_response(&mut self, frame: &Frame) -> Option<ExchangeAction> {
        if !self.started {
            return None;
        }
        let step = self.steps.get_mut(self.cursor)?;
        if frame.command != step.expects {
            return None;
        }

        if let Some(handler) = step.handler.as_mut() {
            handler(frame);
        }
        self.record(StepOutcome::Responded(frame.clone()));
        Some(self.advance())
    }

    /// The current step's deadline passed; skip it
    pub fn on_timeout(&mut self) -> Option<ExchangeAction> {
        if !self.started || self.cursor >= self.steps.len() {
            return None;
        }
        self.record(StepOutcome::TimedOut);
        Some(self.advance())
    }

    /// Index of the step awaiting resolution
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Step awaiting resolution
    pub fn current_step(&self) -> Option<&ExchangeStep> {
        if self.started {
            self.steps.get(self.cursor)
        } else {
            None
        }
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps at all
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether every step has been resolved
    pub fn is_complete(&self) -> bool {
        self.started && self.cursor >= self.steps.len()
    }

    fn record(&mut self, outcome: StepOutcome) {
        let step = &self.steps[self.cursor];
        self.report.steps.push(StepReport {
            description: step.description.clone(),
            command: step.request.command,
            outcome,
        });
    }

    fn advance(&mut self) -> ExchangeAction {
        self.cursor += 1;
        self.current_action()
    }

    fn current_action(&mut self) -> ExchangeAction {
        match self.steps.get(self.cursor) {
            Some(step) => ExchangeAction::Send {
                request: step.request.clone(),
                timeout: step.timeout,
            },
            None => ExchangeAction::Complete(std::mem::take(&mut self.report)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use std::sync::{Arc, Mutex};

    fn ack(command: Command) -> Frame {
        Frame::for_command(command, vec![0x00, 0x01])
    }

    fn two_steps() -> SequencedExchange {
        SequencedExchange::new(vec![
            ExchangeStep::new(Command::Stop.request(), Duration::from_millis(100)),
            ExchangeStep::new(Command::ReadTelemetry.request(), Duration::from_millis(3000)),
        ])
    }

    #[test]
    fn test_start_sends_first_request() {
        let mut ex = two_steps();
        assert_eq!(
            ex.start(),
            ExchangeAction::Send {
                request: Command::Stop.request(),
                timeout: Duration::from_millis(100)
            }
        );
        assert_eq!(ex.cursor(), 0);
    }

    #[test]
    fn test_responses_advance() {
        let mut ex = two_steps();
        ex.start();

        // a frame for another command does not resolve the step
        assert_eq!(ex.on_response(&ack(Command::Run)), None);

        let next = ex.on_response(&ack(Command::Stop)).unwrap();
        assert!(matches!(next, ExchangeAction::Send { ref request, .. } if request.command == 0x21));

        let telemetry = Frame::for_command(Command::ReadTelemetry, vec![0; 8]);
        match ex.on_response(&telemetry).unwrap() {
            ExchangeAction::Complete(report) => {
                assert_eq!(report.steps.len(), 2);
                assert_eq!(report.timed_out_count(), 0);
                assert_eq!(report.final_response(), Some(&telemetry));
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert!(ex.is_complete());
        assert_eq!(ex.on_response(&telemetry), None);
    }

    #[test]
    fn test_timeout_advances_without_retry() {
        let mut ex = two_steps();
        ex.start();

        let next = ex.on_timeout().unwrap();
        assert!(matches!(next, ExchangeAction::Send { ref request, .. } if request.command == 0x21));
        assert_eq!(ex.cursor(), 1);

        match ex.on_timeout().unwrap() {
            ExchangeAction::Complete(report) => {
                assert_eq!(report.timed_out_count(), 2);
                assert!(report.final_step_timed_out());
                assert_eq!(report.steps[0].command, 0x80);
                assert!(report.final_step_timed_out_on(0x21));
                assert!(!report.final_step_timed_out_on(0x80));
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(ex.on_timeout(), None);
    }

    #[test]
    fn test_handler_runs_once_for_its_step() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut ex = SequencedExchange::new(vec![ExchangeStep::new(
            Command::ReadVersion.request(),
            Duration::from_millis(100),
        )
        .on_response(move |f| sink.lock().unwrap().push(f.payload.clone()))]);

        ex.start();
        ex.on_response(&Frame::for_command(Command::ReadVersion, b"VD2.0.0".to_vec()));
        ex.on_response(&Frame::for_command(Command::ReadVersion, b"again".to_vec()));

        assert_eq!(*seen.lock().unwrap(), vec![b"VD2.0.0".to_vec()]);
    }

    #[test]
    fn test_not_started_ignores_input() {
        let mut ex = two_steps();
        assert_eq!(ex.on_response(&ack(Command::Stop)), None);
        assert_eq!(ex.on_timeout(), None);
        assert!(ex.current_step().is_none());
    }

    #[test]
    fn test_empty_exchange_completes_immediately() {
        let mut ex = SequencedExchange::new(Vec::new());
        assert_eq!(ex.start(), ExchangeAction::Complete(ExchangeReport::default()));
        assert!(ex.is_complete());
    }

    #[test]
    fn test_expecting_other_command() {
        let mut ex = SequencedExchange::new(vec![ExchangeStep::new(
            Command::Run.request(),
            Duration::from_millis(100),
        )
        .expecting(0x21)
        .describe("run, then status")]);
        ex.start();
        assert_eq!(ex.on_response(&ack(Command::Run)), None);
        let done = ex
            .on_response(&Frame::for_command(Command::ReadTelemetry, vec![0; 8]))
            .unwrap();
        match done {
            ExchangeAction::Complete(report) => {
                assert_eq!(report.steps[0].description, "run, then status")
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_timed_out_on_other_command() {
        let mut ex = SequencedExchange::new(vec![ExchangeStep::new(
            Command::ReadVersion.request(),
            Duration::from_millis(100),
        )]);
        ex.start();
        match ex.on_timeout().unwrap() {
            ExchangeAction::Complete(report) => {
                assert!(report.final_step_timed_out());
                assert!(!report.final_step_timed_out_on(Command::ReadTelemetry.byte()));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }
}

//! Canned exchanges for the motor board panel

use crate::protocol::{set_speed_request, Command, ProtocolError};

use super::{ExchangeStep, ExchangeTimeouts};

/// Set the speed, run, then read the status
pub fn start_motor(
    rpm: u16,
    timeouts: &ExchangeTimeouts,
) -> Result<Vec<ExchangeStep>, ProtocolError> {
    Ok(vec![
        ExchangeStep::new(set_speed_request(rpm)?, timeouts.step())
            .describe(format!("set speed {} rpm", rpm)),
        ExchangeStep::new(Command::Run.request(), timeouts.step()),
        read_status_step(timeouts),
    ])
}

/// Stop, then read the status
pub fn stop_motor(timeouts: &ExchangeTimeouts) -> Vec<ExchangeStep> {
    vec![
        ExchangeStep::new(Command::Stop.request(), timeouts.step()),
        read_status_step(timeouts),
    ]
}

/// Change the speed of a running motor, then read the status
pub fn set_speed(
    rpm: u16,
    timeouts: &ExchangeTimeouts,
) -> Result<Vec<ExchangeStep>, ProtocolError> {
    Ok(vec![
        ExchangeStep::new(set_speed_request(rpm)?, timeouts.step())
            .describe(format!("set speed {} rpm", rpm)),
        read_status_step(timeouts),
    ])
}

/// Read the telemetry once
pub fn read_status(timeouts: &ExchangeTimeouts) -> Vec<ExchangeStep> {
    vec![read_status_step(timeouts)]
}

/// Read the firmware version
pub fn read_version(timeouts: &ExchangeTimeouts) -> Vec<ExchangeStep> {
    vec![ExchangeStep::new(Command::ReadVersion.request(), timeouts.ack())]
}

/// Read the gear setting
pub fn read_gear(timeouts: &ExchangeTimeouts) -> Vec<ExchangeStep> {
    vec![ExchangeStep::new(Command::ReadGear.request(), timeouts.ack())]
}

fn read_status_step(timeouts: &ExchangeTimeouts) -> ExchangeStep {
    ExchangeStep::new(Command::ReadTelemetry.request(), timeouts.status_read())
}

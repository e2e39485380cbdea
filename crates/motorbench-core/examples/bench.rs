//! MotorBench serial bench tool
//!
//! Emulates the control board, or drives a motor board, on a real serial port
//! and prints the traffic log.
//!
//! Usage:
//!   cargo run --example bench -- [OPTIONS] [ACTION]
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyUSB0)
//!   --baud RATE       Baud rate (default: 9600)
//!   --config FILE     Load a JSON connection config instead
//!   --control         Emulate the control board until Ctrl-C
//!   --list            List serial ports and exit
//!
//! Actions (motor context):
//!   start RPM | stop | speed RPM | status | version | gear
//!
//! Set RUST_LOG=motorbench_core=debug for protocol logging.

use anyhow::{bail, Context, Result};
use motorbench_core::connection::BoardEvent;
use motorbench_core::prelude::*;
use motorbench_core::protocol::list_ports;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config = ConnectionConfig::new("/dev/ttyUSB0", BoardContext::Motor);
    let mut action = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                config.port_name = args.get(i).context("--port needs a value")?.clone();
            }
            "--baud" | "-b" => {
                i += 1;
                config.baud_rate = args
                    .get(i)
                    .context("--baud needs a value")?
                    .parse()
                    .context("invalid baud rate")?;
            }
            "--config" => {
                i += 1;
                let path = args.get(i).context("--config needs a path")?;
                config = ConnectionConfig::load(path)?;
            }
            "--control" => config.context = BoardContext::Control,
            "--list" => {
                for port in list_ports() {
                    match (port.vid, port.pid) {
                        (Some(vid), Some(pid)) => {
                            println!("{}  [{:04x}:{:04x}]", port.name, vid, pid)
                        }
                        _ => println!("{}", port.name),
                    }
                }
                return Ok(());
            }
            other => action.push(other.to_string()),
        }
        i += 1;
    }

    let conn = BoardConnection::open(&config)
        .with_context(|| format!("opening {}", config.port_name))?;
    let mut events = conn.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BoardEvent::Traffic(record)) => println!("{}", record),
                Ok(BoardEvent::Display(update)) => println!("    {:?}", update),
                Ok(BoardEvent::Disconnected) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => eprintln!("... {} events skipped", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if conn.context() == BoardContext::Control {
        println!("emulating control board on {}, Ctrl-C to stop", config.port_name);
        tokio::signal::ctrl_c().await?;
        conn.close().await?;
        return Ok(());
    }

    let rpm = |arg: Option<&String>| -> Result<u16> {
        arg.context("missing RPM")?
            .parse::<u16>()
            .context("RPM must be a number")
    };

    let handle = match action.first().map(String::as_str) {
        Some("start") => conn.start_motor(rpm(action.get(1))?).await?,
        Some("speed") => conn.set_speed(rpm(action.get(1))?).await?,
        Some("stop") => conn.stop_motor().await?,
        Some("status") | None => conn.read_status().await?,
        Some("version") => conn.read_version().await?,
        Some("gear") => conn.read_gear().await?,
        Some(other) => bail!("unknown action: {}", other),
    };

    let report = handle.wait().await?;
    for step in &report.steps {
        println!("{:<20} {:?}", step.description, step.outcome);
    }

    let state = conn.state();
    println!("{}", serde_json::to_string_pretty(&state)?);
    println!("{:?}", conn.stats());

    conn.close().await?;
    Ok(())
}

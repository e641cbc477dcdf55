//! Communication channel between web handlers and the simulation task.
//!
//! The simulator is owned by one task; handlers send requests over an mpsc
//! channel and receive answers on oneshot channels. Snapshots are fanned out
//! to SSE subscribers over a broadcast channel.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::printer::simulator::{Simulator, SimulatorError};
use crate::printer::{PrinterCommand, PrinterSnapshot};

/// A request sent from a web handler to the simulation task.
#[derive(Debug)]
pub enum PrinterRequest {
    /// Get the current printer snapshot.
    Snapshot {
        respond_to: oneshot::Sender<PrinterSnapshot>,
    },
    /// Apply a printer command (print/pause/resume/stop/set_fan).
    Command {
        command: PrinterCommand,
        respond_to: oneshot::Sender<Result<(), SimulatorError>>,
    },
}

/// Drive the simulator: apply incoming requests and advance the state
/// machine on a fixed tick, publishing a snapshot whenever it changes.
/// Runs until all request senders are dropped.
pub async fn run(
    mut sim: Simulator,
    mut requests: mpsc::Receiver<PrinterRequest>,
    updates: broadcast::Sender<PrinterSnapshot>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    tracing::info!("Printer channel closed, simulation task exiting");
                    break;
                };
                match request {
                    PrinterRequest::Snapshot { respond_to } => {
                        let _ = respond_to.send(sim.snapshot());
                    }
                    PrinterRequest::Command { command, respond_to } => {
                        let result = sim.handle_command(command, Instant::now());
                        let accepted = result.is_ok();
                        if let Err(e) = &result {
                            tracing::warn!("Rejected printer command: {}", e);
                        }
                        let _ = respond_to.send(result);
                        if accepted {
                            let _ = updates.send(sim.snapshot());
                        }
                    }
                }
            }
            _ = interval.tick() => {
                if sim.tick(Instant::now()) {
                    let _ = updates.send(sim.snapshot());
                }
            }
        }
    }
}

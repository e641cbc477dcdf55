//! Print-job simulation state machine.
//!
//! The machine is purely timestamp-driven: [`Simulator::tick`] and
//! [`Simulator::handle_command`] take the current `Instant`, so the whole
//! lifecycle can be exercised deterministically without timers. The async
//! layer in [`crate::printer::channel`] drives `tick` from an interval.
//!
//! Lifecycle: free → downloading → preheating → printing ⇄ paused
//! → (done | failed) → cooldown → free.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::SimulatorConfig;
use crate::printer::{JobState, PrintJob, PrinterCommand, PrinterSnapshot, PrinterState};

/// Filament consumed per second of printing, in simulated grams.
const FILAMENT_PER_SEC: f64 = 0.5;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("printer is busy (state: {0})")]
    Busy(PrinterState),
    #[error("command not valid in state {0}")]
    InvalidTransition(PrinterState),
    #[error("no active print job")]
    NoActiveJob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Failed,
}

/// Per-state timing data. Replaced wholesale on every transition, so only
/// one phase clock is ever live.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Free,
    Downloading {
        since: Instant,
    },
    Preheating {
        step: u32,
    },
    Printing {
        /// Print start, shifted forward on resume so elapsed time excludes
        /// paused periods.
        virtual_start: Instant,
    },
    Paused {
        virtual_start: Instant,
        paused_at: Instant,
    },
    Cooling {
        outcome: Outcome,
        finished_at: Instant,
        step: u32,
        from_nozzle: f64,
        from_hotbed: f64,
    },
}

#[derive(Debug, Clone)]
struct JobData {
    taskid: String,
    filename: String,
    estimated: Duration,
    /// `None` when the simulated slicer metadata was withheld.
    total_layers: Option<u32>,
    eta_withheld: bool,
    fan_speed: u8,
    z_offset: f64,
    print_speed_mode: u8,
    progress: f64,
    print_time: Duration,
    supplies_usage: f64,
    curr_layer: u32,
}

/// Stateful printer emulation. Owned by a single task; all mutation goes
/// through [`handle_command`](Simulator::handle_command) and
/// [`tick`](Simulator::tick).
pub struct Simulator {
    cfg: SimulatorConfig,
    id: String,
    name: String,
    model_id: String,
    fwver: u32,
    phase: Phase,
    job: Option<JobData>,
    nozzle_temp: f64,
    target_nozzle: f64,
    hotbed_temp: f64,
    target_hotbed: f64,
}

impl Simulator {
    pub fn new(cfg: SimulatorConfig) -> Self {
        let ambient = cfg.ambient_temp;
        Self {
            cfg,
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: "Kobra Mock".to_string(),
            model_id: "20021".to_string(),
            fwver: 312,
            phase: Phase::Free,
            job: None,
            nozzle_temp: ambient,
            target_nozzle: 0.0,
            hotbed_temp: ambient,
            target_hotbed: 0.0,
        }
    }

    pub fn printer_id(&self) -> &str {
        &self.id
    }

    /// Apply a command at time `now`. Invalid commands leave all state
    /// untouched and report a recoverable error.
    pub fn handle_command(
        &mut self,
        command: PrinterCommand,
        now: Instant,
    ) -> Result<(), SimulatorError> {
        match command {
            PrinterCommand::Print { filename, size_hint } => self.start_print(filename, size_hint, now),
            PrinterCommand::Pause => self.pause(now),
            PrinterCommand::Resume => self.resume(now),
            PrinterCommand::Stop => self.stop(now),
            PrinterCommand::SetFan { speed } => self.set_fan(speed),
        }
    }

    fn start_print(
        &mut self,
        filename: String,
        size_hint: Option<u64>,
        now: Instant,
    ) -> Result<(), SimulatorError> {
        if !matches!(self.phase, Phase::Free) {
            return Err(SimulatorError::Busy(self.state()));
        }

        let est_secs = size_hint
            .map(|size| size / self.cfg.bytes_per_sec)
            .unwrap_or(0)
            .max(self.cfg.min_print_secs);

        // Simulate gcode files whose slicer metadata is missing: either of
        // these can independently come back unknown.
        let eta_withheld = rand::random::<f64>() < self.cfg.withhold_probability;
        let layers_withheld = rand::random::<f64>() < self.cfg.withhold_probability;
        let total_layers = if layers_withheld {
            None
        } else {
            Some(50 + (rand::random::<f64>() * 250.0) as u32)
        };

        tracing::info!(
            "Starting print of '{}' (estimated {}s, eta_withheld={}, layers={:?})",
            filename,
            est_secs,
            eta_withheld,
            total_layers
        );

        self.job = Some(JobData {
            taskid: uuid::Uuid::new_v4().simple().to_string(),
            filename,
            estimated: Duration::from_secs(est_secs),
            total_layers,
            eta_withheld,
            fan_speed: 100,
            z_offset: 0.0,
            print_speed_mode: 1,
            progress: 0.0,
            print_time: Duration::ZERO,
            supplies_usage: 0.0,
            curr_layer: 0,
        });
        self.phase = Phase::Downloading { since: now };
        Ok(())
    }

    fn pause(&mut self, now: Instant) -> Result<(), SimulatorError> {
        match self.phase {
            Phase::Printing { virtual_start } => {
                self.advance_print(now, virtual_start);
                self.phase = Phase::Paused {
                    virtual_start,
                    paused_at: now,
                };
                tracing::info!("Print paused");
                Ok(())
            }
            _ => Err(SimulatorError::InvalidTransition(self.state())),
        }
    }

    fn resume(&mut self, now: Instant) -> Result<(), SimulatorError> {
        match self.phase {
            Phase::Paused {
                virtual_start,
                paused_at,
            } => {
                // Shift the virtual start by the paused duration so elapsed
                // print time continues exactly where it left off.
                self.phase = Phase::Printing {
                    virtual_start: virtual_start + now.duration_since(paused_at),
                };
                tracing::info!("Print resumed");
                Ok(())
            }
            _ => Err(SimulatorError::InvalidTransition(self.state())),
        }
    }

    fn stop(&mut self, now: Instant) -> Result<(), SimulatorError> {
        match self.phase {
            Phase::Downloading { .. }
            | Phase::Preheating { .. }
            | Phase::Printing { .. }
            | Phase::Paused { .. } => {
                tracing::info!("Print stopped by command");
                self.finish(Outcome::Failed, now);
                Ok(())
            }
            Phase::Free | Phase::Cooling { .. } => Err(SimulatorError::NoActiveJob),
        }
    }

    fn set_fan(&mut self, speed: u8) -> Result<(), SimulatorError> {
        match self.job.as_mut() {
            Some(job) => {
                job.fan_speed = speed;
                Ok(())
            }
            None => Err(SimulatorError::NoActiveJob),
        }
    }

    /// Advance the simulation to `now`. Returns true when the snapshot
    /// changed and an update should be emitted.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Free | Phase::Paused { .. } => false,
            Phase::Downloading { since } => {
                if now.duration_since(since) >= Duration::from_secs(self.cfg.download_delay_secs) {
                    self.target_nozzle = self.cfg.nozzle_target;
                    self.target_hotbed = self.cfg.hotbed_target;
                    self.phase = Phase::Preheating { step: 0 };
                    tracing::debug!("Download finished, preheating");
                    true
                } else {
                    false
                }
            }
            Phase::Preheating { step } => {
                let step = step + 1;
                let frac = f64::from(step) / f64::from(self.cfg.heat_steps);
                self.nozzle_temp = lerp(self.cfg.ambient_temp, self.cfg.nozzle_target, frac);
                self.hotbed_temp = lerp(self.cfg.ambient_temp, self.cfg.hotbed_target, frac);
                if step >= self.cfg.heat_steps {
                    self.nozzle_temp = self.cfg.nozzle_target;
                    self.hotbed_temp = self.cfg.hotbed_target;
                    self.phase = Phase::Printing { virtual_start: now };
                    tracing::debug!("Preheat complete, printing");
                } else {
                    self.phase = Phase::Preheating { step };
                }
                true
            }
            Phase::Printing { virtual_start } => {
                self.advance_print(now, virtual_start);
                if self.job.as_ref().is_some_and(|j| j.progress >= 100.0) {
                    tracing::info!("Print complete");
                    self.finish(Outcome::Done, now);
                }
                true
            }
            Phase::Cooling {
                outcome,
                finished_at,
                step,
                from_nozzle,
                from_hotbed,
            } => {
                let step = (step + 1).min(self.cfg.cool_steps);
                let frac = f64::from(step) / f64::from(self.cfg.cool_steps);
                self.nozzle_temp = lerp(from_nozzle, self.cfg.ambient_temp, frac);
                self.hotbed_temp = lerp(from_hotbed, self.cfg.ambient_temp, frac);

                let clear_after = Duration::from_secs(
                    u64::from(self.cfg.cool_steps) * self.cfg.tick_secs
                        + self.cfg.job_clear_grace_secs,
                );
                if step >= self.cfg.cool_steps && now.duration_since(finished_at) >= clear_after {
                    self.job = None;
                    self.phase = Phase::Free;
                    tracing::debug!("Job cleared, printer free");
                } else {
                    self.phase = Phase::Cooling {
                        outcome,
                        finished_at,
                        step,
                        from_nozzle,
                        from_hotbed,
                    };
                }
                true
            }
        }
    }

    /// Recompute job figures from elapsed wall-clock time. Everything is
    /// derived from the same elapsed duration rather than accumulated per
    /// tick, so pause/resume cannot introduce drift.
    fn advance_print(&mut self, now: Instant, virtual_start: Instant) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        let elapsed = now.duration_since(virtual_start);
        let est = job.estimated.as_secs_f64().max(1.0);
        job.progress = (elapsed.as_secs_f64() / est * 100.0).min(100.0);
        job.print_time = elapsed;
        job.supplies_usage = elapsed.as_secs_f64() * FILAMENT_PER_SEC;
        if let Some(total) = job.total_layers {
            job.curr_layer = ((job.progress / 100.0) * f64::from(total)) as u32;
        }
    }

    fn finish(&mut self, outcome: Outcome, now: Instant) {
        if let Some(job) = self.job.as_mut() {
            if outcome == Outcome::Done {
                job.progress = 100.0;
                if let Some(total) = job.total_layers {
                    job.curr_layer = total;
                }
            }
        }
        self.target_nozzle = 0.0;
        self.target_hotbed = 0.0;
        self.phase = Phase::Cooling {
            outcome,
            finished_at: now,
            step: 0,
            from_nozzle: self.nozzle_temp,
            from_hotbed: self.hotbed_temp,
        };
    }

    /// Current wire-level printer state.
    pub fn state(&self) -> PrinterState {
        match self.phase {
            Phase::Free => PrinterState::Free,
            Phase::Downloading { .. } => PrinterState::Downloading,
            Phase::Preheating { .. } => PrinterState::Preheating,
            Phase::Printing { .. } => PrinterState::Printing,
            Phase::Paused { .. } => PrinterState::Paused,
            Phase::Cooling { outcome, .. } => match outcome {
                Outcome::Done => PrinterState::Done,
                Outcome::Failed => PrinterState::Failed,
            },
        }
    }

    fn job_state(&self) -> Option<JobState> {
        match self.phase {
            Phase::Free => None,
            Phase::Downloading { .. } => Some(JobState::Downloading),
            Phase::Preheating { .. } => Some(JobState::Preheating),
            Phase::Printing { .. } => Some(JobState::Printing),
            Phase::Paused { .. } => Some(JobState::Paused),
            Phase::Cooling { outcome, .. } => Some(match outcome {
                Outcome::Done => JobState::Done,
                Outcome::Failed => JobState::Failed,
            }),
        }
    }

    pub fn snapshot(&self) -> PrinterSnapshot {
        let print_job = match (&self.job, self.job_state()) {
            (Some(job), Some(state)) => Some(PrintJob {
                taskid: job.taskid.clone(),
                filename: job.filename.clone(),
                filepath: "/".to_string(),
                state,
                remaining_time: if job.eta_withheld {
                    None
                } else {
                    Some(
                        job.estimated
                            .as_secs()
                            .saturating_sub(job.print_time.as_secs()),
                    )
                },
                progress: job.progress.round() as u8,
                print_time: job.print_time.as_secs(),
                supplies_usage: job.supplies_usage,
                total_layers: job.total_layers,
                curr_layer: job.curr_layer,
                fan_speed: job.fan_speed,
                z_offset: job.z_offset,
                print_speed_mode: job.print_speed_mode,
            }),
            _ => None,
        };

        PrinterSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            model_id: self.model_id.clone(),
            fwver: self.fwver,
            online: true,
            state: self.state(),
            nozzle_temp: format!("{:.0}", self.nozzle_temp),
            target_nozzle_temp: format!("{:.0}", self.target_nozzle),
            hotbed_temp: format!("{:.0}", self.hotbed_temp),
            target_hotbed_temp: format!("{:.0}", self.target_hotbed),
            print_job,
        }
    }
}

fn lerp(from: f64, to: f64, frac: f64) -> f64 {
    from + (to - from) * frac.clamp(0.0, 1.0)
}

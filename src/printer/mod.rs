//! Printer data model and the wire format pushed to the console frontend.
//!
//! The shapes here mirror the payloads of the real backend: temperatures
//! travel as decimal strings, and withheld job metadata is encoded as
//! `remaining_time = 0` / `total_layers = -1` rather than being omitted.

pub mod channel;
pub mod files;
pub mod simulator;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Top-level printer state as shown in the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterState {
    Free,
    Downloading,
    Preheating,
    Printing,
    Paused,
    Done,
    Failed,
}

impl std::fmt::Display for PrinterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrinterState::Free => "free",
            PrinterState::Downloading => "downloading",
            PrinterState::Preheating => "preheating",
            PrinterState::Printing => "printing",
            PrinterState::Paused => "paused",
            PrinterState::Done => "done",
            PrinterState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State of the job itself. Unlike [`PrinterState`] there is no `free`
/// variant: a job only exists while the printer is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Downloading,
    Preheating,
    Printing,
    Paused,
    Done,
    Failed,
}

/// The active print job as serialized on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub taskid: String,
    pub filename: String,
    pub filepath: String,
    pub state: JobState,
    /// Estimated seconds remaining. `None` when the slicer metadata is
    /// unavailable; serialized as `0`, which consumers must treat as
    /// "unknown" rather than "finishing now".
    #[serde(
        serialize_with = "ser_remaining_time",
        deserialize_with = "de_remaining_time"
    )]
    pub remaining_time: Option<u64>,
    /// Percent complete, 0-100.
    pub progress: u8,
    /// Seconds spent printing, excluding paused time.
    pub print_time: u64,
    pub supplies_usage: f64,
    /// `None` when layer metadata is unavailable; serialized as `-1`.
    #[serde(
        serialize_with = "ser_total_layers",
        deserialize_with = "de_total_layers"
    )]
    pub total_layers: Option<u32>,
    pub curr_layer: u32,
    pub fan_speed: u8,
    pub z_offset: f64,
    pub print_speed_mode: u8,
}

/// Full printer snapshot, emitted on every simulation update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterSnapshot {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub fwver: u32,
    pub online: bool,
    pub state: PrinterState,
    pub nozzle_temp: String,
    pub target_nozzle_temp: String,
    pub hotbed_temp: String,
    pub target_hotbed_temp: String,
    pub print_job: Option<PrintJob>,
}

/// Commands accepted by the simulated printer.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterCommand {
    Print {
        filename: String,
        /// File size, when the caller knows it. Drives the estimated
        /// duration so large files print longer.
        size_hint: Option<u64>,
    },
    Pause,
    Resume,
    Stop,
    SetFan {
        speed: u8,
    },
}

fn ser_remaining_time<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(v.unwrap_or(0))
}

fn de_remaining_time<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let raw = u64::deserialize(d)?;
    Ok(if raw == 0 { None } else { Some(raw) })
}

fn ser_total_layers<S: Serializer>(v: &Option<u32>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(n) => s.serialize_i64(*n as i64),
        None => s.serialize_i64(-1),
    }
}

fn de_total_layers<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let raw = i64::deserialize(d)?;
    Ok(u32::try_from(raw).ok())
}

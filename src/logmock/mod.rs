//! In-memory mock of the printer's append-only system log.
//!
//! The log is a line sequence joined with newlines; byte offsets are over
//! the joined UTF-8 stream, which is what the Range-serving endpoint and
//! the tail client operate on. Seed content intentionally includes
//! consecutive duplicates and multi-line entries to exercise run-length
//! folding in consumers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::LogMockConfig;

const SEED_LINES: &[&str] = &[
    "2025-01-15 10:00:00 [INFO] System initialized",
    "2025-01-15 10:00:01 [INFO] Starting web server",
    "2025-01-15 10:00:02 [INFO] Update channel started",
    "2025-01-15 10:00:02 [INFO] Update channel started",
    "2025-01-15 10:00:02 [INFO] Update channel started",
    "2025-01-15 10:00:03 [INFO] API endpoints registered",
    "2025-01-15 10:00:05 [INFO] Printer connection established",
    "2025-01-15 10:00:10 [WARN] Temperature sensor reading high",
    "2025-01-15 10:00:10 [WARN] Temperature sensor reading high",
    "2025-01-15 10:00:15 [INFO] Print job started: test.gcode",
    "2025-01-15 10:00:20 [ERROR] Failed to read file: missing.gcode",
    "2025-01-15 10:00:20 [ERROR] Failed to read file: missing.gcode",
    "2025-01-15 10:00:20 [ERROR] Failed to read file: missing.gcode",
    "2025-01-15 10:00:20 [ERROR] File not found in storage",
    "2025-01-15 10:00:25 [INFO] Print job paused by user",
    "2025-01-15 10:00:30 [INFO] Print job resumed",
    "2025-01-15 10:00:30 [INFO] Print job resumed",
    "2025-01-15 10:00:35 [INFO] Print job completed successfully",
    "2025-01-15 10:00:40 [INFO] System idle",
    "2025-01-15 10:00:40 [INFO] System idle",
    "2025-01-15 10:00:40 [INFO] System idle",
    "2025-01-15 10:00:45 [INFO] Processing G-code command: G28 X Y Z\n  Homing all axes\n  Moving to origin position",
    "2025-01-15 10:00:50 [DEBUG] Long debug message: X position: 100.5mm, Y position: 200.3mm, Z position: 0.2mm, Extruder temperature: 200\u{b0}C, Bed temperature: 60\u{b0}C, Fan speed: 50%, Print speed: 100mm/s",
    "2025-01-15 10:00:55 [INFO] Multi-line status update:\n  Current layer: 15/100\n  Progress: 15%\n  Estimated time remaining: 45 minutes\n  Material used: 12.5g",
];

const FOLLOWUP_LINES: &[&str] = &[
    "[INFO] System check completed",
    "[INFO] Temperature stabilized",
    "[INFO] New print job queued",
    "[WARN] Low filament warning",
    "[INFO] Filament sensor triggered",
    "[INFO] Print job started: model_v2.gcode",
    "[INFO] Layer 1/50 completed",
    "[INFO] Layer 2/50 completed",
    "[INFO] Layer 3/50 completed",
];

const GROWTH_MESSAGES: &[&str] = &[
    "[INFO] System heartbeat",
    "[INFO] Temperature check: OK",
    "[DEBUG] Memory usage: normal",
    "[INFO] Network connection stable",
    "[WARN] Minor temperature fluctuation",
];

const HISTORY_MESSAGES: &[&str] = &[
    "System heartbeat check completed successfully",
    "Temperature sensor reading: Extruder=200\u{b0}C, Bed=60\u{b0}C",
    "G-code command processed: G1 X10 Y20 Z0.2 E5.0",
    "Layer progress update: Current layer 15/100, ETA: 45 minutes",
    "Filament sensor status: OK, Flow rate: 100%",
    "Network connection check: Connected, Latency: 12ms",
    "Memory usage: Used 45MB / Total 128MB (35%)",
    "Print job status: Printing, Progress: 15%",
    "Motor position update: X=100.5mm Y=200.3mm Z=0.2mm",
    "Fan speed adjustment: Cooling fan set to 50%",
    "Heater status: Extruder heating, Target: 200\u{b0}C",
    "Bed leveling check: All points within tolerance",
    "File system check: 125 files found, 2.5GB free space",
    "USB connection: Device detected, Mounted successfully",
    "WiFi signal strength: -45dBm, Excellent connection",
    "Firmware version check: v2.1.3, Up to date",
    "Calibration routine: X-axis homed successfully",
    "Print queue: 3 jobs pending, Next: model_v2.gcode",
    "Temperature warning: Bed temperature slightly high (+2\u{b0}C)",
    "Power supply: Voltage stable at 24.0V, Current: 8.5A",
];

struct LogBuffer {
    lines: Vec<String>,
    followup_index: usize,
}

/// Shared handle to the mock log. Cheap to clone.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<RwLock<LogBuffer>>,
}

impl LogStore {
    /// Create the log with its seed content, optionally pre-padded with
    /// generated history so it already exceeds typical partial-load
    /// ceilings.
    pub fn new(cfg: &LogMockConfig) -> Self {
        let mut lines = Vec::new();
        if cfg.seed_history {
            lines = generate_history(cfg.history_target_bytes);
        }
        lines.extend(SEED_LINES.iter().map(|l| l.to_string()));
        Self {
            inner: Arc::new(RwLock::new(LogBuffer {
                lines,
                followup_index: 0,
            })),
        }
    }

    /// Full log content as one newline-joined byte stream.
    pub async fn content(&self) -> String {
        self.inner.read().await.lines.join("\n")
    }

    /// Total size in bytes of the joined content.
    pub async fn len(&self) -> u64 {
        self.content().await.len() as u64
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lines.is_empty()
    }

    /// Bytes from `start` to the end, together with the total size.
    /// Returns `None` when `start` is at or past the end of the stream.
    pub async fn slice_from(&self, start: u64) -> Option<(Vec<u8>, u64)> {
        let content = self.content().await;
        let total = content.len() as u64;
        if start >= total {
            return None;
        }
        Some((content.as_bytes()[start as usize..].to_vec(), total))
    }

    /// Append one growth entry: the scripted follow-ups first, then random
    /// heartbeat noise.
    pub async fn append_growth_line(&self) {
        let mut buf = self.inner.write().await;
        if buf.followup_index < FOLLOWUP_LINES.len() {
            let line = format!("2025-01-15 10:01:{:02} {}", 10 + buf.followup_index * 5, FOLLOWUP_LINES[buf.followup_index]);
            buf.followup_index += 1;
            buf.lines.push(line);
        } else {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
            let idx = (rand::random::<f64>() * GROWTH_MESSAGES.len() as f64) as usize
                % GROWTH_MESSAGES.len();
            buf.lines.push(format!("{} {}", timestamp, GROWTH_MESSAGES[idx]));
        }
    }

    /// Reset to a single "cleared" line. From a client's point of view this
    /// is a file rotation: the total size drops below any previous cursor.
    pub async fn clear(&self) {
        let mut buf = self.inner.write().await;
        buf.lines = vec![format!(
            "{} [INFO] Log cleared",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )];
        buf.followup_index = 0;
    }
}

/// Pre-generate enough timestamped entries to reach roughly `target_bytes`.
fn generate_history(target_bytes: u64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut total: u64 = 0;
    let mut count: usize = 0;
    let base = chrono::NaiveDate::from_ymd_opt(2025, 1, 10)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now);

    while total < target_bytes && count < 10_000 {
        let timestamp = base + chrono::Duration::seconds(count as i64 * 5);
        let level = if count % 50 == 0 {
            "ERROR"
        } else if count % 20 == 0 {
            "WARN"
        } else if count % 5 == 0 {
            "DEBUG"
        } else {
            "INFO"
        };
        let line = format!(
            "{} [{}] {}",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            level,
            HISTORY_MESSAGES[count % HISTORY_MESSAGES.len()]
        );
        total += line.len() as u64 + 1;
        lines.push(line);
        count += 1;
    }
    lines
}

/// Periodically append entries to `store` so follow-mode clients see the
/// log grow. The task runs until aborted.
pub fn spawn_growth(store: LogStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; skip it so growth starts one
        // interval after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.append_growth_line().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> LogMockConfig {
        LogMockConfig {
            seed_history: false,
            ..LogMockConfig::default()
        }
    }

    #[tokio::test]
    async fn seed_content_and_size() {
        let store = LogStore::new(&small_cfg());
        let content = store.content().await;
        assert!(content.starts_with("2025-01-15 10:00:00 [INFO] System initialized"));
        assert_eq!(store.len().await, content.len() as u64);
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn slice_from_midpoint() {
        let store = LogStore::new(&small_cfg());
        let content = store.content().await;
        let (bytes, total) = store.slice_from(10).await.unwrap();
        assert_eq!(total, content.len() as u64);
        assert_eq!(bytes, &content.as_bytes()[10..]);
    }

    #[tokio::test]
    async fn slice_past_end_is_none() {
        let store = LogStore::new(&small_cfg());
        let size = store.len().await;
        assert!(store.slice_from(size).await.is_none());
        assert!(store.slice_from(size + 100).await.is_none());
    }

    #[tokio::test]
    async fn growth_appends_lines() {
        let store = LogStore::new(&small_cfg());
        let before = store.len().await;
        store.append_growth_line().await;
        let content = store.content().await;
        assert!(content.len() as u64 > before);
        assert!(content.ends_with("[INFO] System check completed"));
    }

    #[tokio::test]
    async fn clear_shrinks_log() {
        let store = LogStore::new(&small_cfg());
        let before = store.len().await;
        store.clear().await;
        assert!(store.len().await < before);
        assert!(store.content().await.contains("Log cleared"));
    }

    #[tokio::test]
    async fn history_reaches_target_size() {
        let cfg = LogMockConfig {
            seed_history: true,
            history_target_bytes: 250 * 1024,
            ..LogMockConfig::default()
        };
        let store = LogStore::new(&cfg);
        assert!(store.len().await >= 250 * 1024);
    }
}

//! Generated gcode file listing served to the console's file browser.
//!
//! A few fixed entries are followed by a batch of randomized ones so list
//! virtualization and long-name handling can be exercised in the UI.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of randomized entries appended to the static list.
const GENERATED_COUNT: usize = 90;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub size: u64,
    pub timestamp: i64,
    pub is_dir: bool,
    pub is_local: bool,
}

fn gcode(filename: &str, size: u64, timestamp: i64) -> FileEntry {
    FileEntry {
        filename: filename.to_string(),
        size,
        timestamp,
        is_dir: false,
        is_local: true,
    }
}

fn static_entries() -> Vec<FileEntry> {
    vec![
        gcode("benchy.gcode", 123_456, 1_709_932_644),
        gcode("flat-test.gcode", 7_890, 1_709_932_645),
        gcode("calibration-cube.gcode", 4_567, 1_709_932_646),
        gcode("wh40k-spacemarine.gcode", 987_654, 1_709_932_647),
    ]
}

fn random_suffix(len: usize) -> String {
    (0..len)
        .map(|_| {
            let idx = (rand::random::<f64>() * CHARSET.len() as f64) as usize % CHARSET.len();
            CHARSET[idx] as char
        })
        .collect()
}

fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d_%H-%M-%S").to_string(),
        None => "1970-01-01_00-00-00".to_string(),
    }
}

/// Build the full mock file listing: the static entries plus a batch of
/// randomized variants with timestamped names.
pub fn generate_listing() -> Vec<FileEntry> {
    let statics = static_entries();
    let now = Utc::now().timestamp();
    let mut entries = statics.clone();

    for i in 0..GENERATED_COUNT {
        let base = &statics[i % statics.len()];
        let stem = base.filename.trim_end_matches(".gcode");
        let timestamp = now - (rand::random::<f64>() * 1_000_000.0) as i64;
        entries.push(gcode(
            &format!(
                "{}_{}_{}.gcode",
                stem,
                random_suffix(16),
                format_timestamp(timestamp)
            ),
            (rand::random::<f64>() * 2_000_000.0) as u64,
            timestamp,
        ));
    }

    entries
}

/// Look up the size of a file by name, used to scale simulated print
/// duration when a print is started.
pub fn size_of<'a>(entries: &'a [FileEntry], filename: &str) -> Option<u64> {
    entries
        .iter()
        .find(|e| e.filename == filename)
        .map(|e| e.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_contains_statics_and_generated() {
        let entries = generate_listing();
        assert_eq!(entries.len(), 4 + GENERATED_COUNT);
        assert_eq!(entries[0].filename, "benchy.gcode");
        assert!(entries.iter().all(|e| !e.is_dir && e.is_local));
        assert!(entries[10].filename.ends_with(".gcode"));
    }

    #[test]
    fn size_lookup() {
        let entries = generate_listing();
        assert_eq!(size_of(&entries, "benchy.gcode"), Some(123_456));
        assert_eq!(size_of(&entries, "missing.gcode"), None);
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_timestamp(0), "1970-01-01_00-00-00");
    }
}

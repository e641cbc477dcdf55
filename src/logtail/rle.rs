//! Run-length folding of consecutive duplicate log lines.
//!
//! Printer logs repeat themselves; the console displays `line ×N` instead
//! of N identical rows. Folding happens per fetched chunk, and a chunk
//! whose first line continues the run at the end of the display is merged
//! across the boundary.

use serde::{Deserialize, Serialize};

/// One displayed log row. `count` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub line: String,
    pub count: u32,
    /// Marks the synthetic warning row shown when only the tail of a large
    /// log was loaded. Never merged with real lines.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_partial_marker: bool,
}

impl LogEntry {
    fn new(line: &str) -> Self {
        Self {
            line: line.to_string(),
            count: 1,
            is_partial_marker: false,
        }
    }

    /// The synthetic leading entry of a partial log view.
    pub fn partial_marker(size_ceiling: u64) -> Self {
        Self {
            line: format!(
                "[partial log] showing only the last {} KB of the log file",
                size_ceiling / 1024
            ),
            count: 1,
            is_partial_marker: true,
        }
    }
}

/// Fold consecutive duplicate lines into counted entries.
pub fn encode<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = Vec::new();
    for line in lines {
        match entries.last_mut() {
            Some(last) if last.line == line => last.count += 1,
            _ => entries.push(LogEntry::new(line)),
        }
    }
    entries
}

/// Expand entries back to the original line sequence. Synthetic markers are
/// not part of the log and are skipped.
pub fn decode(entries: &[LogEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| !e.is_partial_marker)
        .flat_map(|e| std::iter::repeat_n(e.line.clone(), e.count as usize))
        .collect()
}

/// Append a freshly folded chunk, coalescing a run that continues from the
/// last displayed entry.
pub fn merge_append(existing: &mut Vec<LogEntry>, new: Vec<LogEntry>) {
    let mut new = new.into_iter();
    if let Some(first) = new.next() {
        match existing.last_mut() {
            Some(last) if !last.is_partial_marker && last.line == first.line => {
                last.count += first.count;
            }
            _ => existing.push(first),
        }
        existing.extend(new);
    }
}

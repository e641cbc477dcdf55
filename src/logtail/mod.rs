//! Incremental log tailing over HTTP byte ranges.
//!
//! The remote log is an append-only byte stream served with `Range`
//! support. The tailer keeps a byte cursor; each poll requests
//! `bytes=cursor-` and folds the returned lines into the displayed
//! sequence. The cursor never exceeds the observed remote size: a reported
//! total below the cursor means the file rotated, which resets the cursor
//! and triggers a full reload.

pub mod rle;

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header;
use thiserror::Error;

use crate::config::TailSettings;
pub use rle::LogEntry;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("log fetch failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("log fetch failed: HTTP {0}")]
    Status(u16),
}

/// Tailing parameters. Defaults mirror the console's log viewer: a 200 KB
/// initial-load ceiling, 2 s polls, and five retries starting at 1 s.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub url: String,
    pub size_ceiling: u64,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
}

impl TailConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_settings(url, &TailSettings::default())
    }

    pub fn from_settings(url: impl Into<String>, settings: &TailSettings) -> Self {
        Self {
            url: url.into(),
            size_ceiling: settings.size_ceiling,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            max_retries: settings.max_retries,
            initial_retry_delay: Duration::from_millis(settings.initial_retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentRange {
    /// `Content-Range: bytes start-end/total`
    Satisfied { end: u64, total: u64 },
    /// `Content-Range: bytes */total`, sent with 416 responses.
    Unsatisfied { total: u64 },
}

fn parse_content_range(header: &str) -> Option<ContentRange> {
    static SATISFIED: OnceLock<Regex> = OnceLock::new();
    static UNSATISFIED: OnceLock<Regex> = OnceLock::new();
    let satisfied = SATISFIED
        .get_or_init(|| Regex::new(r"bytes\s+(\d+)-(\d+)/(\d+)").expect("static regex"));
    let unsatisfied =
        UNSATISFIED.get_or_init(|| Regex::new(r"bytes\s+\*/(\d+)").expect("static regex"));

    if let Some(caps) = satisfied.captures(header) {
        return Some(ContentRange::Satisfied {
            end: caps[2].parse().ok()?,
            total: caps[3].parse().ok()?,
        });
    }
    if let Some(caps) = unsatisfied.captures(header) {
        return Some(ContentRange::Unsatisfied {
            total: caps[1].parse().ok()?,
        });
    }
    None
}

/// Incremental tail of one remote log.
pub struct LogTailer {
    client: reqwest::Client,
    cfg: TailConfig,
    position: u64,
    partial: bool,
    entries: Vec<LogEntry>,
}

impl LogTailer {
    pub fn new(cfg: TailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
            position: 0,
            partial: false,
            entries: Vec::new(),
        }
    }

    /// The folded entries currently making up the display.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Whether the current view was truncated to the tail of the log.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Byte offset the next poll will fetch from.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn poll_interval(&self) -> Duration {
        self.cfg.poll_interval
    }

    async fn remote_size(&self) -> Option<u64> {
        let response = self.client.head(&self.cfg.url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    fn header_content_range(response: &reqwest::Response) -> Option<ContentRange> {
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
    }

    /// Initial or full (re)load. When the remote log exceeds the size
    /// ceiling, only the tail is fetched and a synthetic warning entry is
    /// prefixed to the view.
    pub async fn load(&mut self) -> Result<(), TailError> {
        self.position = 0;
        self.partial = false;
        self.entries.clear();

        let mut range_start = None;
        if let Some(size) = self.remote_size().await {
            if size > self.cfg.size_ceiling {
                range_start = Some(size - self.cfg.size_ceiling);
                self.partial = true;
            }
        }

        let mut request = self.client.get(&self.cfg.url);
        if let Some(start) = range_start {
            request = request.header(header::RANGE, format!("bytes={}-", start));
        }
        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 416 {
            // The log vanished between the size probe and the fetch.
            // Treat as empty; the next poll starts over from zero.
            self.partial = false;
            return Ok(());
        }
        if !status.is_success() {
            return Err(TailError::Status(status.as_u16()));
        }

        let range_honored = status.as_u16() == 206;
        let content_range = Self::header_content_range(&response);
        let body = response.bytes().await?;
        let text = String::from_utf8_lossy(&body);

        // A 200 despite a Range request means the server ignored it and the
        // body is the whole file: the cursor must not include the skipped
        // prefix, and the view is not partial after all.
        self.position = match content_range {
            Some(ContentRange::Satisfied { end, .. }) => end + 1,
            _ if range_honored => range_start.unwrap_or(0) + body.len() as u64,
            _ => body.len() as u64,
        };
        if !range_honored {
            self.partial = false;
        }

        if self.partial {
            self.entries.push(LogEntry::partial_marker(self.cfg.size_ceiling));
        }
        let folded = rle::encode(text.split('\n').filter(|l| !l.is_empty()));
        rle::merge_append(&mut self.entries, folded);
        Ok(())
    }

    /// One follow-mode poll. Transient failures are retried with
    /// exponential backoff up to the configured bound, after which the
    /// poll gives up silently with no new entries; this never returns an
    /// error to the caller.
    pub async fn poll(&mut self) -> Vec<LogEntry> {
        let mut attempt: u32 = 0;
        loop {
            match self.poll_once().await {
                Ok(new_entries) => return new_entries,
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.cfg.max_retries {
                        tracing::warn!("Log poll giving up after {} attempts: {}", attempt, e);
                        return Vec::new();
                    }
                    let delay = self.cfg.initial_retry_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!("Log poll failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn poll_once(&mut self) -> Result<Vec<LogEntry>, TailError> {
        let response = self
            .client
            .get(&self.cfg.url)
            .header(header::RANGE, format!("bytes={}-", self.position))
            .send()
            .await?;
        let status = response.status();

        if status.as_u16() == 416 {
            // Either nothing new (cursor sits exactly at the end) or the
            // file rotated. Content-Range: bytes */T tells us which.
            return match Self::header_content_range(&response) {
                Some(ContentRange::Unsatisfied { total }) if total >= self.position => {
                    self.position = total;
                    Ok(Vec::new())
                }
                _ => self.reload_after_rotation().await,
            };
        }
        if !status.is_success() {
            return Err(TailError::Status(status.as_u16()));
        }

        let content_range = Self::header_content_range(&response);
        if let Some(ContentRange::Satisfied { total, .. }) = content_range {
            if total < self.position {
                return self.reload_after_rotation().await;
            }
        }

        let body = response.bytes().await?;
        let text = String::from_utf8_lossy(&body);
        self.position = match content_range {
            Some(ContentRange::Satisfied { end, .. }) => end + 1,
            // Full 200 response: the body is the whole file.
            _ => body.len() as u64,
        };

        let new_entries = rle::encode(text.split('\n').filter(|l| !l.is_empty()));
        let appended = new_entries.clone();
        rle::merge_append(&mut self.entries, new_entries);
        Ok(appended)
    }

    async fn reload_after_rotation(&mut self) -> Result<Vec<LogEntry>, TailError> {
        tracing::info!("Remote log rotated (size below cursor), reloading from start");
        self.load().await?;
        Ok(self.entries.clone())
    }
}

//! Program time windows.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Wire timestamp format: fourteen digits, `YYYYMMDDHHMMSS`, JST wall clock.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Container extension of recordings.
pub const OUTPUT_EXTENSION: &str = "m4a";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("invalid timestamp {0:?}: expected YYYYMMDDHHMMSS")]
    InvalidTimestamp(String),

    #[error("window end {end} must be after start {start}")]
    EndNotAfterStart { start: String, end: String },
}

/// Immutable `(start, end)` pair; `end` is strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl StreamWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, WindowError> {
        if end <= start {
            return Err(WindowError::EndNotAfterStart {
                start: format_timestamp(start),
                end: format_timestamp(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two wire timestamps.
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Length of the program.
    pub fn duration(&self) -> Duration {
        // end > start, so the delta is positive
        (self.end - self.start).to_std().unwrap_or_default()
    }

    pub fn start_stamp(&self) -> String {
        format_timestamp(self.start)
    }

    pub fn end_stamp(&self) -> String {
        format_timestamp(self.end)
    }

    /// `<station>_<start>_<end>.m4a`
    pub fn file_name(&self, station_id: &str) -> String {
        format!(
            "{station_id}_{}_{}.{OUTPUT_EXTENSION}",
            self.start_stamp(),
            self.end_stamp()
        )
    }
}

impl fmt::Display for StreamWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Parse a fourteen-digit wire timestamp.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, WindowError> {
    let raw = raw.trim();
    if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WindowError::InvalidTimestamp(raw.to_string()));
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|_| WindowError::InvalidTimestamp(raw.to_string()))
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

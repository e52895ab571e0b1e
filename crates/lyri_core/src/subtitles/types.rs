//! Subtitle data types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One timed caption.
///
/// Times are integer milliseconds from the start of the audio, the
/// precision SRT carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEvent {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl SubtitleEvent {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Build from fractional seconds, as reported by recognition engines.
    pub fn from_secs(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self::new(secs_to_ms(start), secs_to_ms(end), text)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.end_ms.saturating_sub(self.start_ms))
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Errors from reading subtitle files.
#[derive(Error, Debug)]
pub enum SubtitleError {
    #[error("Invalid timestamp on line {line}: '{content}'")]
    InvalidTime { line: usize, content: String },

    #[error("Subtitle file contains no events")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubtitleError {
    pub fn invalid_time(line: usize, content: impl Into<String>) -> Self {
        Self::InvalidTime {
            line,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_secs_rounds_to_ms() {
        let event = SubtitleEvent::from_secs(1.2345, 2.0, "word");
        assert_eq!(event.start_ms, 1235);
        assert_eq!(event.end_ms, 2000);
        assert_eq!(event.duration(), Duration::from_millis(765));
    }

    #[test]
    fn negative_or_nan_clamps_to_zero() {
        let event = SubtitleEvent::from_secs(-1.0, f64::NAN, "x");
        assert_eq!(event.start_ms, 0);
        assert_eq!(event.end_ms, 0);
    }
}

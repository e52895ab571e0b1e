//! SubRip (.srt) reading and writing.
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:04,000
//! Hello, world!
//! ```
//!
//! Indices are ignored on read and regenerated on write.

use std::fs;
use std::path::Path;

use super::types::{SubtitleError, SubtitleEvent};

/// Parse SRT content.
///
/// Blocks without a timing line are skipped; a timing line that does not
/// parse is an error.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleEvent>, SubtitleError> {
    let content = content
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut events = Vec::new();
    let mut block: Vec<(usize, &str)> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            flush_block(&mut block, &mut events)?;
        } else {
            block.push((idx + 1, line));
        }
    }
    flush_block(&mut block, &mut events)?;

    Ok(events)
}

fn flush_block(
    block: &mut Vec<(usize, &str)>,
    events: &mut Vec<SubtitleEvent>,
) -> Result<(), SubtitleError> {
    let Some(timing_idx) = block.iter().position(|(_, l)| l.contains("-->")) else {
        block.clear();
        return Ok(());
    };

    let (line_no, timing) = block[timing_idx];
    let (start_ms, end_ms) =
        parse_srt_timing(timing).ok_or_else(|| SubtitleError::invalid_time(line_no, timing))?;

    let text = block[timing_idx + 1..]
        .iter()
        .map(|(_, l)| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    if !text.is_empty() {
        events.push(SubtitleEvent::new(start_ms, end_ms, text));
    }
    block.clear();
    Ok(())
}

fn parse_srt_timing(line: &str) -> Option<(u64, u64)> {
    let (start, end) = line.split_once("-->")?;
    // Position hints such as "X1:40 X2:600" may follow the end time
    let end = end.split_whitespace().next()?;
    Some((parse_srt_time(start)?, parse_srt_time(end)?))
}

/// Parse `HH:MM:SS,mmm` (a period is accepted for the comma).
pub fn parse_srt_time(s: &str) -> Option<u64> {
    let s = s.trim().replace(',', ".");
    let mut parts = s.split(':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let (secs, frac) = match seconds_part.split_once('.') {
        Some((s, f)) => (s, f),
        None => (seconds_part, ""),
    };
    let seconds: u64 = secs.trim().parse().ok()?;
    let millis: u64 = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().take(3).collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value: u64 = digits.parse().ok()?;
        value * 10u64.pow(3 - digits.len() as u32)
    };

    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

/// Format milliseconds as `HH:MM:SS,mmm`.
pub fn format_srt_time(ms: u64) -> String {
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}

/// Render events as SRT.
pub fn write_srt(events: &[SubtitleEvent]) -> String {
    let mut output = String::new();

    for (i, event) in events.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_time(event.start_ms),
            format_srt_time(event.end_ms)
        ));
        output.push_str(&event.text);
        output.push('\n');
    }

    output
}

/// Read and parse an SRT file.
pub fn read_srt_file(path: &Path) -> Result<Vec<SubtitleEvent>, SubtitleError> {
    let content = fs::read_to_string(path)?;
    parse_srt(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_srt_times() {
        assert_eq!(parse_srt_time("00:00:00,000"), Some(0));
        assert_eq!(parse_srt_time("00:00:01,500"), Some(1500));
        assert_eq!(parse_srt_time("01:00:00,000"), Some(3_600_000));
        assert_eq!(parse_srt_time("00:00:01.5"), Some(1500));
        assert_eq!(parse_srt_time("00:00:01,5000"), Some(1500));
        assert_eq!(parse_srt_time("00:01"), None);
        assert_eq!(parse_srt_time("aa:bb:cc,ddd"), None);
    }

    #[test]
    fn formats_srt_times() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(61_234), "00:01:01,234");
        assert_eq!(format_srt_time(3_600_000), "01:00:00,000");
    }

    #[test]
    fn parses_basic_srt() {
        let content = "1\n00:00:01,000 --> 00:00:04,000\nHello, world!\n\n2\r\n00:00:05,000 --> 00:00:08,000\r\nTwo\r\nlines\r\n";
        let events = parse_srt(content).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SubtitleEvent::new(1000, 4000, "Hello, world!"));
        assert_eq!(events[1].text, "Two\nlines");
    }

    #[test]
    fn tolerates_missing_index_and_bom() {
        let content = "\u{feff}00:00:01,000 --> 00:00:02,000\nfirst\n\n\n00:00:03,000 --> 00:00:04,000 X1:0\nsecond\n";
        let events = parse_srt(content).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].start_ms, 3000);
    }

    #[test]
    fn bad_timing_is_an_error() {
        let content = "1\n00:00:01,000 --> nonsense\ntext\n";
        let err = parse_srt(content).unwrap_err();
        assert!(matches!(err, SubtitleError::InvalidTime { line: 2, .. }));
    }

    #[test]
    fn writes_srt() {
        let events = vec![
            SubtitleEvent::new(1000, 4000, "Hello, world!"),
            SubtitleEvent::new(5000, 8000, "Test subtitle."),
        ];
        let expected = "1\n00:00:01,000 --> 00:00:04,000\nHello, world!\n\n2\n00:00:05,000 --> 00:00:08,000\nTest subtitle.\n";
        assert_eq!(write_srt(&events), expected);
        assert_eq!(parse_srt(expected).unwrap(), events);
    }
}

//! Subtitle model, SRT I/O and normalization.

mod normalize;
mod srt;
mod types;

pub use normalize::{is_normalized, normalize_events};
pub use srt::{format_srt_time, parse_srt, parse_srt_time, read_srt_file, write_srt};
pub use types::{SubtitleError, SubtitleEvent};

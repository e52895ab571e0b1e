//! External tool invocation.
//!
//! - `ToolRunner`: subprocess execution with stage timeout and cancellation
//! - ffprobe duration and frame-rate probing
//! - `AudioTranscoder` for WAV preparation and stem delivery

mod probe;
mod runner;
mod transcode;

pub use probe::{parse_fps_fraction, probe_duration, probe_frame_rate};
pub use runner::{ToolCommand, ToolError, ToolOutput, ToolRunner};
pub use transcode::{has_extension, AudioTranscoder, FfmpegTranscoder};

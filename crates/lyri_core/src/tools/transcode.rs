//! Audio format conversion.

use std::path::Path;

use super::runner::{ToolCommand, ToolError, ToolRunner};

/// Converts an audio file to the format implied by the output extension.
pub trait AudioTranscoder: Send + Sync {
    fn transcode(&self, input: &Path, output: &Path, runner: &ToolRunner) -> Result<(), ToolError>;
}

/// ffmpeg-backed transcoder.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Command line for one conversion.
    pub fn command(&self, input: &Path, output: &Path) -> ToolCommand {
        let mut command = ToolCommand::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .arg("-vn");

        let ext = output
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        command = match ext.as_str() {
            "wav" => command.args(["-acodec", "pcm_s16le"]),
            "mp3" => command.args(["-acodec", "libmp3lame", "-q:a", "2"]),
            _ => command,
        };

        command.arg(output)
    }
}

impl AudioTranscoder for FfmpegTranscoder {
    fn transcode(&self, input: &Path, output: &Path, runner: &ToolRunner) -> Result<(), ToolError> {
        runner.run(&self.command(input, output))?;
        Ok(())
    }
}

/// Whether a file already has the given extension (case-insensitive).
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext.trim_start_matches('.')))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn mp3_output_uses_lame() {
        let transcoder = FfmpegTranscoder::new("ffmpeg");
        let cmd = transcoder.command(Path::new("/in/a.wav"), Path::new("/out/vocal.mp3"));
        let args: Vec<OsString> = cmd.get_args().to_vec();
        assert!(args.contains(&OsString::from("libmp3lame")));
        assert_eq!(args.last(), Some(&OsString::from("/out/vocal.mp3")));
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(has_extension(Path::new("song.WAV"), "wav"));
        assert!(has_extension(Path::new("song.mp3"), ".mp3"));
        assert!(!has_extension(Path::new("song"), "wav"));
    }
}

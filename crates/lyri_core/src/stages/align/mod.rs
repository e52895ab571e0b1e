//! Lyrics alignment: produce timed captions for the vocal stem.
//!
//! Two interchangeable strategies sit behind the `Aligner` trait:
//! - `ForcedAligner` aligns the known lyrics text
//! - `RecognitionAligner` transcribes the vocal audio with word timings
//!
//! Whatever an aligner returns is normalized before it is written, so
//! the subtitle artifact always satisfies the ordering invariants.

mod forced;
mod language;
mod recognition;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::artifacts::{commit, ensure_parent, partial_path};
use crate::config::AlignmentSettings;
use crate::models::AlignStrategy;
use crate::subtitles::{normalize_events, write_srt, SubtitleEvent};

use super::errors::{StageEnv, StageResult};

pub use forced::ForcedAligner;
pub use language::{detect_language, normalize_code, resolve_language, rewrite_task_language};
pub use recognition::RecognitionAligner;

/// Inputs for one alignment.
#[derive(Debug, Clone)]
pub struct AlignRequest {
    /// Vocal stem.
    pub vocal: PathBuf,
    /// Lyrics text. Required by forced alignment only.
    pub lyrics: Option<PathBuf>,
    /// Language override (ISO 639-1 or 639-3).
    pub language_hint: Option<String>,
    /// Private directory for engine files.
    pub work_dir: PathBuf,
}

/// Events produced by an aligner, before normalization.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    pub events: Vec<SubtitleEvent>,
    pub language: Option<String>,
}

/// An alignment strategy.
pub trait Aligner: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `AlignRequest::lyrics` must be set.
    fn needs_lyrics(&self) -> bool;

    fn align(&self, request: &AlignRequest, env: &StageEnv) -> StageResult<AlignmentOutcome>;
}

/// Build the configured aligner.
pub fn aligner_from_settings(settings: &AlignmentSettings) -> Box<dyn Aligner> {
    match settings.strategy {
        AlignStrategy::Forced => Box::new(ForcedAligner::from_settings(settings)),
        AlignStrategy::Recognition => Box::new(RecognitionAligner::from_settings(settings)),
    }
}

/// Normalize events and write them to `target` as SRT, all-or-nothing.
///
/// Returns the number of events written.
pub fn write_subtitles(events: Vec<SubtitleEvent>, target: &Path) -> io::Result<usize> {
    let events = normalize_events(events);
    let partial = partial_path(target);
    ensure_parent(&partial)?;
    if let Err(e) = fs::write(&partial, write_srt(&events)) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    commit(&partial, target)?;
    Ok(events.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::{is_normalized, read_srt_file};
    use crate::artifacts::partials_in;
    use tempfile::tempdir;

    #[test]
    fn written_subtitles_are_normalized() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("align").join("subtitle.srt");
        let events = vec![
            SubtitleEvent::new(3000, 5000, "two"),
            SubtitleEvent::new(1000, 4000, "one"),
            SubtitleEvent::new(6000, 6500, ""),
        ];

        let written = write_subtitles(events, &target).unwrap();
        assert_eq!(written, 2);

        let back = read_srt_file(&target).unwrap();
        assert!(is_normalized(&back));
        assert_eq!(back[0], SubtitleEvent::new(1000, 3000, "one"));
        assert!(partials_in(target.parent().unwrap()).is_empty());
    }

    #[test]
    fn strategy_picks_aligner() {
        let mut settings = AlignmentSettings::default();
        assert_eq!(aligner_from_settings(&settings).name(), "forced");
        assert!(aligner_from_settings(&settings).needs_lyrics());

        settings.strategy = AlignStrategy::Recognition;
        let aligner = aligner_from_settings(&settings);
        assert_eq!(aligner.name(), "recognition");
        assert!(!aligner.needs_lyrics());
    }
}

//! Speech-recognition alignment with word-level timestamps.
//!
//! The transcript comes from the audio alone, so its text may differ from
//! the uploaded lyrics. Each recognised word becomes one caption.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::AlignmentSettings;
use crate::stages::errors::{StageEnv, StageError, StageResult};
use crate::subtitles::SubtitleEvent;
use crate::tools::ToolCommand;

use super::{AlignRequest, Aligner, AlignmentOutcome};

/// Runs `{command} AUDIO --model M --device D --output_format json
/// --output_dir DIR` (whisperx) and reads its `word_segments`.
#[derive(Debug, Clone)]
pub struct RecognitionAligner {
    command: Vec<String>,
    model: String,
    device: String,
}

#[derive(Debug, Deserialize)]
struct Transcript {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    word_segments: Vec<Word>,
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Clone, Deserialize)]
struct Word {
    word: String,
    start: Option<f64>,
    end: Option<f64>,
}

impl RecognitionAligner {
    pub fn from_settings(settings: &AlignmentSettings) -> Self {
        Self {
            command: settings.recognition_command.clone(),
            model: settings.recognition_model.clone(),
            device: settings.device.clone(),
        }
    }

    fn output_path(audio: &Path, work_dir: &Path) -> PathBuf {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "vocal".to_string());
        work_dir.join(format!("{}.json", stem))
    }
}

/// Turn a recognition transcript into events, skipping untimed words.
fn events_from_transcript(content: &str) -> Result<(Vec<SubtitleEvent>, Option<String>), String> {
    let transcript: Transcript =
        serde_json::from_str(content).map_err(|e| format!("unreadable transcript: {}", e))?;

    let words: Vec<Word> = if transcript.word_segments.is_empty() {
        transcript
            .segments
            .into_iter()
            .flat_map(|s| s.words)
            .collect()
    } else {
        transcript.word_segments
    };

    let events = words
        .into_iter()
        .filter_map(|w| match (w.start, w.end) {
            (Some(start), Some(end)) => Some(SubtitleEvent::from_secs(start, end, w.word.trim())),
            _ => None,
        })
        .collect();

    Ok((events, transcript.language))
}

impl Aligner for RecognitionAligner {
    fn name(&self) -> &str {
        "recognition"
    }

    fn needs_lyrics(&self) -> bool {
        false
    }

    fn align(&self, request: &AlignRequest, env: &StageEnv) -> StageResult<AlignmentOutcome> {
        fs::create_dir_all(&request.work_dir)
            .map_err(|e| StageError::from_io("creating work directory", e, StageError::Alignment))?;

        let command = ToolCommand::from_argv(&self.command)
            .ok_or_else(|| StageError::alignment("no recognition command configured"))?
            .arg(&request.vocal)
            .args(["--model", self.model.as_str(), "--device", self.device.as_str()])
            .args(["--output_format", "json", "--output_dir"])
            .arg(&request.work_dir);
        env.runner()
            .run(&command)
            .map_err(|e| StageError::from_tool(e, StageError::Alignment))?;

        let output = Self::output_path(&request.vocal, &request.work_dir);
        let content = fs::read_to_string(&output)
            .map_err(|e| StageError::from_io("reading transcript", e, StageError::Alignment))?;
        let (events, language) = events_from_transcript(&content).map_err(StageError::Alignment)?;

        if events.is_empty() {
            return Err(StageError::alignment("no timed words recognised"));
        }
        env.logger
            .info(&format!("Recognised {} timed words", events.len()));

        Ok(AlignmentOutcome { events, language })
    }
}

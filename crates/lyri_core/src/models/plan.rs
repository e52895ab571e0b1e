//! Task metadata and the per-run plan handed to the orchestrator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::enums::ProductionMode;

/// Optional per-task settings uploaded as the `metadata` input.
///
/// Every field is optional; missing fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Production mode (`music`, `karaoke`, `separate_audio`, ...).
    #[serde(default, alias = "production_mode", skip_serializing_if = "Option::is_none")]
    pub production_type: Option<ProductionMode>,
    /// Text overlay drawn on the video. An empty string disables the overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_text: Option<String>,
    /// Lyrics language (ISO 639-3) that overrides detection.
    #[serde(default, alias = "language_hint", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TaskMetadata {
    /// Parse a metadata document.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}

/// Everything the orchestrator needs to run one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Task identifier (used for logging only).
    pub task_id: String,
    /// Mixed input audio.
    pub audio: PathBuf,
    /// Lyrics text file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<PathBuf>,
    /// Background image or video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<PathBuf>,
    /// What to produce.
    pub mode: ProductionMode,
    /// Overlay text override; `None` uses the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_text: Option<String>,
    /// Lyrics language override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
}

impl TaskPlan {
    /// Create a plan with only the audio input set.
    pub fn new(task_id: impl Into<String>, audio: impl Into<PathBuf>, mode: ProductionMode) -> Self {
        Self {
            task_id: task_id.into(),
            audio: audio.into(),
            lyrics: None,
            background: None,
            mode,
            overlay_text: None,
            language_hint: None,
        }
    }

    pub fn with_lyrics(mut self, lyrics: impl Into<PathBuf>) -> Self {
        self.lyrics = Some(lyrics.into());
        self
    }

    pub fn with_background(mut self, background: impl Into<PathBuf>) -> Self {
        self.background = Some(background.into());
        self
    }

    pub fn with_overlay_text(mut self, text: impl Into<String>) -> Self {
        self.overlay_text = Some(text.into());
        self
    }

    pub fn with_language_hint(mut self, language: impl Into<String>) -> Self {
        self.language_hint = Some(language.into());
        self
    }

    /// Input file name without extension, used to name artifacts.
    pub fn audio_stem(&self) -> String {
        file_stem(&self.audio)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_parses_original_fields() {
        let meta = TaskMetadata::from_json(
            r#"{"production_type": "karaoke", "overlay_text": "", "audio_file_name": "x.mp3"}"#,
        )
        .unwrap();
        assert_eq!(meta.production_type, Some(ProductionMode::KaraokeVideo));
        assert_eq!(meta.overlay_text.as_deref(), Some(""));
        assert!(meta.language.is_none());
    }

    #[test]
    fn plan_audio_stem() {
        let plan = TaskPlan::new("t1", "/in/Nine Thou.wav", ProductionMode::MusicVideo);
        assert_eq!(plan.audio_stem(), "Nine Thou");
    }
}

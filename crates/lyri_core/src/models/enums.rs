//! Core enums used throughout the pipeline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the pipeline should produce for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionMode {
    /// Captioned video over the full original mix.
    #[default]
    #[serde(alias = "music")]
    MusicVideo,
    /// Captioned video over the instrumental stem only.
    #[serde(alias = "karaoke")]
    KaraokeVideo,
    /// Separated stems re-encoded for delivery, no alignment or video.
    #[serde(alias = "separate_audio")]
    StemsOnly,
}

impl ProductionMode {
    /// Whether this mode runs the Align and Compose stages.
    pub fn produces_video(&self) -> bool {
        !matches!(self, ProductionMode::StemsOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionMode::MusicVideo => "music_video",
            ProductionMode::KaraokeVideo => "karaoke_video",
            ProductionMode::StemsOnly => "stems_only",
        }
    }
}

impl std::fmt::Display for ProductionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "music" | "music_video" | "music-video" => Ok(ProductionMode::MusicVideo),
            "karaoke" | "karaoke_video" | "karaoke-video" => Ok(ProductionMode::KaraokeVideo),
            "separate_audio" | "stems_only" | "stems-only" | "stems" => {
                Ok(ProductionMode::StemsOnly)
            }
            other => Err(format!("unknown production mode '{}'", other)),
        }
    }
}

/// Logical key of a file handed to a task by the upload surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKey {
    Audio,
    Background,
    Lyrics,
    Metadata,
}

impl InputKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKey::Audio => "audio",
            InputKey::Background => "background",
            InputKey::Lyrics => "lyrics",
            InputKey::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for InputKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(InputKey::Audio),
            "background" => Ok(InputKey::Background),
            "lyrics" | "text" => Ok(InputKey::Lyrics),
            "metadata" | "meta" => Ok(InputKey::Metadata),
            other => Err(format!("unknown input key '{}'", other)),
        }
    }
}

/// Kind of file produced by a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The original mix (delivered in stems-only mode).
    Audio,
    /// Isolated vocal stem.
    Vocal,
    /// Isolated instrumental stem.
    Instrumental,
    /// Time-aligned subtitle file.
    Subtitle,
    /// Final captioned video.
    Video,
    /// WAV copy of the input mix fed to the separator.
    PreparedAudio,
    /// Background video with its audio track removed.
    SilentBackground,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Vocal => "vocal",
            ArtifactKind::Instrumental => "instrumental",
            ArtifactKind::Subtitle => "subtitle",
            ArtifactKind::Video => "video",
            ArtifactKind::PreparedAudio => "prepared_audio",
            ArtifactKind::SilentBackground => "silent_background",
        }
    }

    /// Whether this kind may appear in a task's result set.
    pub fn is_deliverable(&self) -> bool {
        !matches!(
            self,
            ArtifactKind::PreparedAudio | ArtifactKind::SilentBackground
        )
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage name, used for artifact namespacing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prepare,
    Separate,
    Deliver,
    Align,
    Compose,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Separate => "separate",
            Stage::Deliver => "deliver",
            Stage::Align => "align",
            Stage::Compose => "compose",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a separated stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemRole {
    Vocal,
    Instrumental,
}

/// Alignment strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignStrategy {
    /// Rule-based forced alignment of the lyrics text.
    #[default]
    Forced,
    /// Speech recognition with word-level timestamps.
    Recognition,
}

impl std::fmt::Display for AlignStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignStrategy::Forced => write!(f, "forced"),
            AlignStrategy::Recognition => write!(f, "recognition"),
        }
    }
}

/// Orientation of the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Horizontal,
    Vertical,
}

impl AspectRatio {
    /// Orient a landscape `(width, height)` pair.
    pub fn orient(&self, resolution: (u32, u32)) -> (u32, u32) {
        let (long, short) = if resolution.0 >= resolution.1 {
            resolution
        } else {
            (resolution.1, resolution.0)
        };
        match self {
            AspectRatio::Horizontal => (long, short),
            AspectRatio::Vertical => (short, long),
        }
    }
}

/// Failure class recorded on a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Separation,
    UnsupportedLanguage,
    Alignment,
    Composition,
    Transcode,
    /// Inputs unreadable or missing when the run started.
    Setup,
    /// Anything else, including a crashed worker.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Separation => "separation",
            FailureKind::UnsupportedLanguage => "unsupported_language",
            FailureKind::Alignment => "alignment",
            FailureKind::Composition => "composition",
            FailureKind::Transcode => "transcode",
            FailureKind::Setup => "setup",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

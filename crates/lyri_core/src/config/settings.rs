//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::models::{AlignStrategy, AspectRatio};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Cache and log directories.
    #[serde(default)]
    pub paths: PathSettings,

    /// Source separation engine.
    #[serde(default)]
    pub separation: SeparationSettings,

    /// Lyrics alignment engines.
    #[serde(default)]
    pub alignment: AlignmentSettings,

    /// Video composition and audio delivery.
    #[serde(default)]
    pub composition: CompositionSettings,

    /// Background execution limits.
    #[serde(default)]
    pub executor: ExecutorSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Cache, log and default asset locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder holding uploaded input files.
    #[serde(default = "default_input_cache")]
    pub input_cache: String,

    /// Folder holding stage artifacts and final outputs.
    #[serde(default = "default_output_cache")]
    pub output_cache: String,

    /// Folder for per-task log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Background used when a task has none. Empty means a solid colour.
    #[serde(default)]
    pub default_background: String,
}

fn default_input_cache() -> String {
    "inputs_cache".to_string()
}

fn default_output_cache() -> String {
    "aligner_cache".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            input_cache: default_input_cache(),
            output_cache: default_output_cache(),
            logs_folder: default_logs_folder(),
            default_background: String::new(),
        }
    }
}

impl PathSettings {
    /// Default background path, if one is configured.
    pub fn default_background_path(&self) -> Option<PathBuf> {
        if self.default_background.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.default_background))
        }
    }
}

/// Separation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationSettings {
    /// Separator command line (program followed by fixed arguments).
    #[serde(default = "default_separator_command")]
    pub command: Vec<String>,

    /// Model checkpoint file.
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Number of independent engine instances. 1 serializes all separations.
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,

    /// File name label identifying the vocal stem.
    #[serde(default = "default_vocal_label")]
    pub vocal_label: String,

    /// File name label identifying the instrumental stem.
    #[serde(default = "default_instrumental_label")]
    pub instrumental_label: String,

    /// Stem file format requested from the engine.
    #[serde(default = "default_stem_format")]
    pub output_format: String,
}

fn default_separator_command() -> Vec<String> {
    vec!["audio-separator".to_string()]
}

fn default_model_path() -> String {
    "./checkpoints/vocal_separator/Kim_Vocal_2.onnx".to_string()
}

fn default_max_instances() -> usize {
    1
}

fn default_vocal_label() -> String {
    "Vocals".to_string()
}

fn default_instrumental_label() -> String {
    "Instrumental".to_string()
}

fn default_stem_format() -> String {
    "WAV".to_string()
}

impl Default for SeparationSettings {
    fn default() -> Self {
        Self {
            command: default_separator_command(),
            model_path: default_model_path(),
            max_instances: default_max_instances(),
            vocal_label: default_vocal_label(),
            instrumental_label: default_instrumental_label(),
            output_format: default_stem_format(),
        }
    }
}

/// Alignment engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentSettings {
    /// Which aligner to use.
    #[serde(default)]
    pub strategy: AlignStrategy,

    /// Forced aligner command line.
    #[serde(default = "default_forced_command")]
    pub forced_command: Vec<String>,

    /// Forced aligner configuration string (`key=value|key=value`).
    #[serde(default = "default_config_string")]
    pub config_string: String,

    /// Language the config string is written for (ISO 639-3).
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Other languages the config string may be rewritten to (ISO 639-3).
    #[serde(default = "default_allowed_languages")]
    pub allowed_languages: Vec<String>,

    /// Recognition aligner command line.
    #[serde(default = "default_recognition_command")]
    pub recognition_command: Vec<String>,

    /// Recognition model name.
    #[serde(default = "default_recognition_model")]
    pub recognition_model: String,

    /// Device passed to the recognition engine.
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_forced_command() -> Vec<String> {
    ["python3", "-m", "aeneas.tools.execute_task"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_config_string() -> String {
    "task_language=eng|os_task_file_format=srt|is_text_type=plain|os_task_adjust_boundary_nonspeech_min=1.0|os_task_vad_threshold=0.5".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_allowed_languages() -> Vec<String> {
    vec!["rus".to_string()]
}

fn default_recognition_command() -> Vec<String> {
    vec!["whisperx".to_string()]
}

fn default_recognition_model() -> String {
    "large-v2".to_string()
}

fn default_device() -> String {
    "cuda".to_string()
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            strategy: AlignStrategy::default(),
            forced_command: default_forced_command(),
            config_string: default_config_string(),
            default_language: default_language(),
            allowed_languages: default_allowed_languages(),
            recognition_command: default_recognition_command(),
            recognition_model: default_recognition_model(),
            device: default_device(),
        }
    }
}

/// Video composition and audio delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionSettings {
    /// Path to ffmpeg (or name in PATH).
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// Path to ffprobe (or name in PATH).
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,

    /// Landscape output resolution `[width, height]`.
    #[serde(default = "default_resolution")]
    pub resolution: [u32; 2],

    /// Output orientation.
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Text drawn in the top-left corner. Empty disables it.
    #[serde(default = "default_overlay_text")]
    pub overlay_text: String,

    /// Frame rate used when the background cannot be probed.
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate: f64,

    /// x264 preset.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Audio format (file extension) for delivered stems.
    #[serde(default = "default_delivery_format")]
    pub delivery_format: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_resolution() -> [u32; 2] {
    [1920, 1080]
}

fn default_overlay_text() -> String {
    "by Lyri.ai".to_string()
}

fn default_frame_rate() -> f64 {
    24.0
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_delivery_format() -> String {
    "mp3".to_string()
}

impl Default for CompositionSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            resolution: default_resolution(),
            aspect_ratio: AspectRatio::default(),
            overlay_text: default_overlay_text(),
            default_frame_rate: default_frame_rate(),
            preset: default_preset(),
            delivery_format: default_delivery_format(),
        }
    }
}

impl CompositionSettings {
    /// Output frame size after applying the aspect ratio.
    pub fn target_resolution(&self) -> (u32, u32) {
        self.aspect_ratio
            .orient((self.resolution[0], self.resolution[1]))
    }
}

/// Background execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Pipelines allowed to run at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Per-stage timeout in seconds. 0 disables the timeout.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Status polling interval used by `wait_for_terminal`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_stage_timeout() -> u64 {
    3600
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            stage_timeout_secs: default_stage_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl ExecutorSettings {
    pub fn stage_timeout(&self) -> Option<Duration> {
        (self.stage_timeout_secs > 0).then(|| Duration::from_secs(self.stage_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for task logs.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep tool output out of the log unless a tool fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines shown when a tool fails.
    #[serde(default = "default_error_tail")]
    pub error_tail: usize,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> usize {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Separation,
    Alignment,
    Composition,
    Executor,
    Logging,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Paths,
        ConfigSection::Separation,
        ConfigSection::Alignment,
        ConfigSection::Composition,
        ConfigSection::Executor,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Separation => "separation",
            ConfigSection::Alignment => "alignment",
            ConfigSection::Composition => "composition",
            ConfigSection::Executor => "executor",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Cache, log and default asset locations",
            ConfigSection::Separation => "Vocal/instrumental separation engine",
            ConfigSection::Alignment => "Lyrics alignment engines",
            ConfigSection::Composition => "Video composition and stem delivery",
            ConfigSection::Executor => "Background execution limits",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[alignment]"));
        assert!(toml.contains("output_cache"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[paths]\noutput_cache = \"custom_output\"\n[alignment]\nstrategy = \"recognition\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.paths.output_cache, "custom_output");
        assert_eq!(parsed.alignment.strategy, AlignStrategy::Recognition);
        assert_eq!(parsed.alignment.default_language, "eng");
        assert_eq!(parsed.separation.max_instances, 1);
        assert_eq!(parsed.composition.resolution, [1920, 1080]);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let mut executor = ExecutorSettings::default();
        assert_eq!(executor.stage_timeout(), Some(Duration::from_secs(3600)));
        executor.stage_timeout_secs = 0;
        assert_eq!(executor.stage_timeout(), None);
    }

    #[test]
    fn vertical_target_resolution() {
        let mut composition = CompositionSettings::default();
        composition.aspect_ratio = AspectRatio::Vertical;
        assert_eq!(composition.target_resolution(), (1080, 1920));
    }
}

//! Video composition: background + audio + burned-in captions.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{commit, ensure_parent, partial_path, ArtifactPathResolver};
use crate::config::CompositionSettings;
use crate::tools::{probe_duration, probe_frame_rate, ToolCommand, ToolRunner};

use super::errors::{StageEnv, StageError, StageResult};

/// File extensions treated as still images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff"];

/// What the video is drawn over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Background {
    /// Still image looped for the audio duration.
    Image(PathBuf),
    /// Video looped for the audio duration, its own audio discarded.
    Video(PathBuf),
    /// Solid black frame.
    Solid,
}

impl Background {
    /// Classify a background file by extension.
    pub fn classify(path: &Path) -> Self {
        let is_image = path
            .extension()
            .map(|e| {
                let e = e.to_string_lossy().to_ascii_lowercase();
                IMAGE_EXTENSIONS.contains(&e.as_str())
            })
            .unwrap_or(false);
        if is_image {
            Background::Image(path.to_path_buf())
        } else {
            Background::Video(path.to_path_buf())
        }
    }

    /// The task's background if it has one, else an existing default,
    /// else a solid colour.
    pub fn resolve(task: Option<&Path>, default: Option<&Path>) -> Self {
        match task {
            Some(path) => Self::classify(path),
            None => match default.filter(|p| p.is_file()) {
                Some(path) => Self::classify(path),
                None => Background::Solid,
            },
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Background::Image(p) | Background::Video(p) => Some(p),
            Background::Solid => None,
        }
    }
}

/// Inputs for one composition.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Soundtrack (full mix or instrumental).
    pub audio: PathBuf,
    /// Normalized SRT to burn in.
    pub subtitle: PathBuf,
    pub background: Background,
    /// Corner text; `None` or empty draws nothing.
    pub overlay_text: Option<String>,
    /// Output frame size.
    pub resolution: (u32, u32),
    /// Cache path for the audio-stripped copy of a video background.
    pub silent_background: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposeOutcome {
    pub duration_secs: f64,
}

/// Renders the final video.
pub trait Composer: Send + Sync {
    /// Write the video to `output`. On error nothing is left at `output`.
    fn compose(
        &self,
        request: &ComposeRequest,
        output: &Path,
        env: &StageEnv,
    ) -> StageResult<ComposeOutcome>;
}

/// Escape a value for use inside a filter option and then inside a
/// filtergraph string.
pub fn escape_filter_value(value: &str) -> String {
    let mut level1 = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            level1.push('\\');
        }
        level1.push(c);
    }

    let mut level2 = String::with_capacity(level1.len());
    for c in level1.chars() {
        if matches!(c, '\\' | '\'' | ',' | ';' | '[' | ']') {
            level2.push('\\');
        }
        level2.push(c);
    }
    level2
}

/// Build the `-vf` chain: fit inside `width`x`height`, pad with black,
/// burn in the subtitles, then draw the overlay text if any.
pub fn build_filter_graph(width: u32, height: u32, subtitle: &Path, overlay: Option<&str>) -> String {
    let scale = format!(
        "scale='if(gt(iw/ih,{w}/{h}),{w},-2)':'if(gt(iw/ih,{w}/{h}),-2,{h})'",
        w = width,
        h = height
    );
    let pad = format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2:color=black", width, height);
    let subtitles = format!(
        "subtitles={}",
        escape_filter_value(&subtitle.to_string_lossy())
    );

    let mut graph = format!("{},{},{}", scale, pad, subtitles);
    if let Some(text) = overlay.map(str::trim).filter(|t| !t.is_empty()) {
        // drawtext expands %{...} sequences
        let text = text.replace('%', "\\%");
        graph.push_str(&format!(
            ",drawtext=text={}:x=5:y=5:fontcolor=white:fontsize='sqrt(w*h)*0.05'",
            escape_filter_value(&text)
        ));
    }
    graph
}

/// ffmpeg/ffprobe composer.
#[derive(Debug, Clone)]
pub struct FfmpegComposer {
    ffmpeg: String,
    ffprobe: String,
    preset: String,
    default_frame_rate: f64,
}

impl FfmpegComposer {
    pub fn from_settings(settings: &CompositionSettings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg_path.clone(),
            ffprobe: settings.ffprobe_path.clone(),
            preset: settings.preset.clone(),
            default_frame_rate: if settings.default_frame_rate > 0.0 {
                settings.default_frame_rate
            } else {
                24.0
            },
        }
    }

    /// Final render command.
    pub fn render_command(
        &self,
        request: &ComposeRequest,
        duration: f64,
        frame_rate: f64,
        output: &Path,
    ) -> ToolCommand {
        let (width, height) = request.resolution;
        let duration_arg = format!("{:.3}", duration);
        let mut command = ToolCommand::new(&self.ffmpeg).args(["-y", "-hide_banner"]);

        command = match request.background {
            Background::Image(ref image) => command
                .args(["-loop", "1", "-framerate"])
                .arg(format!("{}", frame_rate))
                .args(["-t", duration_arg.as_str(), "-i"])
                .arg(image),
            Background::Video(_) => command
                .args(["-stream_loop", "-1", "-i"])
                .arg(&request.silent_background),
            Background::Solid => command.args(["-f", "lavfi", "-i"]).arg(format!(
                "color=c=black:s={}x{}:r={}:d={}",
                width, height, frame_rate, duration_arg
            )),
        };

        let overlay = request.overlay_text.as_deref();
        command
            .arg("-i")
            .arg(&request.audio)
            .arg("-vf")
            .arg(build_filter_graph(width, height, &request.subtitle, overlay))
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(["-c:v", "libx264", "-preset", self.preset.as_str()])
            .args(["-pix_fmt", "yuv420p", "-color_range", "tv"])
            .args(["-c:a", "aac", "-shortest", "-t", duration_arg.as_str()])
            .arg(output)
    }

    /// Command removing the audio track from a video background.
    pub fn strip_audio_command(&self, video: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(video)
            .args(["-an", "-c:v", "copy"])
            .arg(output)
    }

    fn ensure_silent_background(
        &self,
        video: &Path,
        target: &Path,
        runner: &ToolRunner,
    ) -> StageResult<()> {
        if ArtifactPathResolver::is_cached(target) {
            runner.logger().cached(&format!(
                "Silent background {}",
                target.display()
            ));
            return Ok(());
        }

        let partial = partial_path(target);
        ensure_parent(&partial)
            .map_err(|e| StageError::from_io("creating compose directory", e, StageError::Composition))?;
        if let Err(e) = runner.run(&self.strip_audio_command(video, &partial)) {
            let _ = fs::remove_file(&partial);
            return Err(StageError::from_tool(e, StageError::Composition));
        }
        commit(&partial, target)
            .map_err(|e| StageError::from_io("storing silent background", e, StageError::Composition))
    }

    fn frame_rate(&self, background: &Background, runner: &ToolRunner) -> StageResult<f64> {
        let Some(path) = background.path() else {
            return Ok(self.default_frame_rate);
        };
        let probed = probe_frame_rate(runner, &self.ffprobe, path)
            .map_err(|e| StageError::from_tool(e, StageError::Composition))?;
        Ok(match probed {
            // Still images report a nominal 25 fps; keep the configured rate
            Some(fps) if matches!(background, Background::Video(_)) => fps,
            _ => self.default_frame_rate,
        })
    }
}

impl Composer for FfmpegComposer {
    fn compose(
        &self,
        request: &ComposeRequest,
        output: &Path,
        env: &StageEnv,
    ) -> StageResult<ComposeOutcome> {
        let runner = env.runner();

        let duration = probe_duration(&runner, &self.ffprobe, &request.audio)
            .map_err(|e| StageError::from_tool(e, StageError::Composition))?;
        let frame_rate = self.frame_rate(&request.background, &runner)?;
        env.logger.info(&format!(
            "Audio duration {:.2}s, {} fps, {}x{}",
            duration, frame_rate, request.resolution.0, request.resolution.1
        ));

        if let Background::Video(ref video) = request.background {
            self.ensure_silent_background(video, &request.silent_background, &runner)?;
        }

        let partial = partial_path(output);
        ensure_parent(&partial)
            .map_err(|e| StageError::from_io("creating compose directory", e, StageError::Composition))?;

        let command = self.render_command(request, duration, frame_rate, &partial);
        if let Err(e) = runner.run(&command) {
            let _ = fs::remove_file(&partial);
            return Err(StageError::from_tool(e, StageError::Composition));
        }
        if !ArtifactPathResolver::is_cached(&partial) {
            let _ = fs::remove_file(&partial);
            return Err(StageError::composition("ffmpeg produced an empty video"));
        }

        commit(&partial, output)
            .map_err(|e| StageError::from_io("storing video", e, StageError::Composition))?;

        Ok(ComposeOutcome {
            duration_secs: duration,
        })
    }
}

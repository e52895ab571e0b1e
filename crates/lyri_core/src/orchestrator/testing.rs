//! Fake engines and a ready-made context for unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};

use crate::artifacts::ArtifactPathResolver;
use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::logging::{LogConfig, TaskLogger};
use crate::models::{ProductionMode, StemRole, TaskPlan};
use crate::stages::{
    AlignRequest, Aligner, AlignmentOutcome, ComposeOutcome, ComposeRequest, Composer, EngineStem,
    SeparationEngine, SeparatorPool, StageEnv, StageError, StageResult,
};
use crate::subtitles::SubtitleEvent;
use crate::tools::{AudioTranscoder, ToolError, ToolRunner};

use super::{artifact_bases, Context, Orchestrator, StageEngines};

/// Writes two stems derived from the input bytes.
#[derive(Clone)]
pub struct FakeSeparator {
    single: bool,
    inputs: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeSeparator {
    pub fn tagged() -> Self {
        Self {
            single: false,
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Produces only one stem.
    pub fn single() -> Self {
        Self {
            single: true,
            ..Self::tagged()
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }

    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().clone()
    }
}

impl SeparationEngine for FakeSeparator {
    fn separate(&mut self, mixed: &Path, scratch_dir: &Path, _env: &StageEnv) -> StageResult<Vec<EngineStem>> {
        self.inputs.lock().push(mixed.to_path_buf());
        let io = |e| StageError::from_io("fake separation", e, StageError::Separation);

        fs::create_dir_all(scratch_dir).map_err(io)?;
        let mut content = fs::read(mixed).map_err(io)?;

        let vocal = scratch_dir.join("song_(Vocals).wav");
        content.extend_from_slice(b"-vocal");
        fs::write(&vocal, &content).map_err(io)?;
        if self.single {
            return Ok(vec![EngineStem::new(vocal, None)]);
        }

        let instrumental = scratch_dir.join("song_(Instrumental).wav");
        content.extend_from_slice(b"-instrumental");
        fs::write(&instrumental, &content).map_err(io)?;

        Ok(vec![
            EngineStem::new(instrumental, Some(StemRole::Instrumental)),
            EngineStem::new(vocal, Some(StemRole::Vocal)),
        ])
    }
}

/// Returns two overlapping events; rejects the `fra` hint.
#[derive(Default)]
pub struct FakeAligner {
    calls: AtomicUsize,
}

impl FakeAligner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Aligner for FakeAligner {
    fn name(&self) -> &str {
        "fake"
    }

    fn needs_lyrics(&self) -> bool {
        true
    }

    fn align(&self, request: &AlignRequest, _env: &StageEnv) -> StageResult<AlignmentOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.language_hint.as_deref() == Some("fra") {
            return Err(StageError::unsupported_language("fra", &["rus".to_string()]));
        }
        Ok(AlignmentOutcome {
            events: vec![
                SubtitleEvent::new(2000, 3000, "second line"),
                SubtitleEvent::new(0, 2500, "la la la"),
            ],
            language: Some("eng".to_string()),
        })
    }
}

/// Records requests and writes a placeholder video.
#[derive(Default)]
pub struct FakeComposer {
    requests: Mutex<Vec<ComposeRequest>>,
}

impl FakeComposer {
    pub fn requests(&self) -> Vec<ComposeRequest> {
        self.requests.lock().clone()
    }
}

impl Composer for FakeComposer {
    fn compose(&self, request: &ComposeRequest, output: &Path, _env: &StageEnv) -> StageResult<ComposeOutcome> {
        self.requests.lock().push(request.clone());
        let io = |e| StageError::from_io("fake composition", e, StageError::Composition);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        fs::write(output, b"fake-mp4").map_err(io)?;
        Ok(ComposeOutcome { duration_secs: 3.0 })
    }
}

/// Copies instead of converting.
#[derive(Default)]
pub struct CopyTranscoder {
    calls: AtomicUsize,
}

impl CopyTranscoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AudioTranscoder for CopyTranscoder {
    fn transcode(&self, input: &Path, output: &Path, _runner: &ToolRunner) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::copy(input, output).map_err(|source| ToolError::Io {
            program: "copy".to_string(),
            source,
        })?;
        Ok(())
    }
}

/// A context over a temp directory with fake engines.
pub struct TestRig {
    pub dir: TempDir,
    pub ctx: Context,
    pub separator: FakeSeparator,
    pub aligner: Arc<FakeAligner>,
    pub composer: Arc<FakeComposer>,
    pub transcoder: Arc<CopyTranscoder>,
}

impl TestRig {
    pub fn new(mode: ProductionMode) -> Self {
        Self::build(mode, "song.wav", FakeSeparator::tagged())
    }

    pub fn build(mode: ProductionMode, audio_name: &str, separator: FakeSeparator) -> Self {
        let dir = tempdir().unwrap();
        let inputs = dir.path().join("inputs");
        fs::create_dir_all(&inputs).unwrap();

        let audio = inputs.join(audio_name);
        fs::write(&audio, b"RIFF-fake-audio").unwrap();
        let lyrics = inputs.join("lyrics.txt");
        fs::write(&lyrics, "la la la\nsecond line\n").unwrap();

        let mut settings = Settings::default();
        settings.paths.output_cache = dir.path().join("cache").to_string_lossy().to_string();
        settings.paths.logs_folder = dir.path().join("logs").to_string_lossy().to_string();

        let plan = TaskPlan::new("test-task", audio, mode).with_lyrics(lyrics);

        let aligner = Arc::new(FakeAligner::default());
        let composer = Arc::new(FakeComposer::default());
        let transcoder = Arc::new(CopyTranscoder::default());
        let engines = StageEngines::new(
            SeparatorPool::new(vec![Box::new(separator.clone())]),
            aligner.clone(),
            composer.clone(),
            transcoder.clone(),
        );

        let resolver = ArtifactPathResolver::new(
            &settings.paths.output_cache,
            &settings.composition.delivery_format,
        );
        let bases = artifact_bases(&plan, &settings).unwrap();
        let logger = Arc::new(TaskLogger::detached(
            "test-task",
            LogConfig {
                mirror_to_tracing: false,
                ..LogConfig::default()
            },
        ));
        let ctx = Context::new(
            plan,
            Arc::new(settings),
            engines,
            resolver,
            bases,
            logger,
            CancelToken::new(),
        );

        Self {
            dir,
            ctx,
            separator,
            aligner,
            composer,
            transcoder,
        }
    }

    /// Orchestrator sharing this rig's settings and engines.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.ctx.settings.as_ref().clone(), self.ctx.engines.clone())
    }
}

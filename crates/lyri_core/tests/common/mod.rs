//! Shared harness for the task-level tests: fake engines that record what
//! they were asked to do, and an executor wired to them.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};

use lyri_core::config::Settings;
use lyri_core::executor::TaskExecutor;
use lyri_core::models::{InputKey, ProductionMode, StemRole};
use lyri_core::orchestrator::{Orchestrator, StageEngines};
use lyri_core::stages::align::resolve_language;
use lyri_core::stages::{
    AlignRequest, Aligner, AlignmentOutcome, ComposeOutcome, ComposeRequest, Composer, EngineStem,
    SeparationEngine, SeparatorPool, StageEnv, StageError, StageResult,
};
use lyri_core::subtitles::SubtitleEvent;
use lyri_core::tasks::{TaskId, TaskSnapshot, TaskStore};
use lyri_core::tools::{AudioTranscoder, ToolError, ToolRunner};

/// What the fake engines observed.
#[derive(Default)]
pub struct Stats {
    pub separations: AtomicUsize,
    pub separating_now: AtomicUsize,
    pub max_separating: AtomicUsize,
    pub alignments: AtomicUsize,
    pub compositions: AtomicUsize,
    pub transcodes: AtomicUsize,
    pub composed_audio: Mutex<Vec<PathBuf>>,
}

impl Stats {
    pub fn separations(&self) -> usize {
        self.separations.load(Ordering::SeqCst)
    }

    pub fn max_separating(&self) -> usize {
        self.max_separating.load(Ordering::SeqCst)
    }

    pub fn alignments(&self) -> usize {
        self.alignments.load(Ordering::SeqCst)
    }

    pub fn compositions(&self) -> usize {
        self.compositions.load(Ordering::SeqCst)
    }
}

struct FakeSeparator {
    stats: Arc<Stats>,
    delay: Duration,
}

impl SeparationEngine for FakeSeparator {
    fn separate(&mut self, mixed: &Path, scratch_dir: &Path, env: &StageEnv) -> StageResult<Vec<EngineStem>> {
        let stats = &self.stats;
        let now = stats.separating_now.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_separating.fetch_max(now, Ordering::SeqCst);
        stats.separations.fetch_add(1, Ordering::SeqCst);

        let result = (|| {
            if env.cancel.sleep(self.delay) {
                return Err(StageError::Cancelled);
            }
            let io = |e| StageError::from_io("fake separator", e, StageError::Separation);
            fs::create_dir_all(scratch_dir).map_err(io)?;
            let mixed = fs::read(mixed).map_err(io)?;

            let instrumental = scratch_dir.join("mix_(Instrumental).wav");
            let vocal = scratch_dir.join("mix_(Vocals).wav");
            fs::write(&instrumental, [&mixed[..], b"|instrumental"].concat()).map_err(io)?;
            fs::write(&vocal, [&mixed[..], b"|vocal"].concat()).map_err(io)?;

            Ok(vec![
                EngineStem::new(instrumental, Some(StemRole::Instrumental)),
                EngineStem::new(vocal, Some(StemRole::Vocal)),
            ])
        })();

        stats.separating_now.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Checks the language like the forced aligner and returns fixed timings.
struct FakeAligner {
    stats: Arc<Stats>,
}

impl Aligner for FakeAligner {
    fn name(&self) -> &str {
        "fake"
    }

    fn needs_lyrics(&self) -> bool {
        true
    }

    fn align(&self, request: &AlignRequest, _env: &StageEnv) -> StageResult<AlignmentOutcome> {
        self.stats.alignments.fetch_add(1, Ordering::SeqCst);
        let lyrics = request
            .lyrics
            .as_ref()
            .ok_or_else(|| StageError::alignment("no lyrics"))?;
        let text = fs::read_to_string(lyrics)
            .map_err(|e| StageError::from_io("reading lyrics", e, StageError::Alignment))?;
        let language = resolve_language(
            request.language_hint.as_deref(),
            &text,
            "eng",
            &["rus".to_string()],
        )?;

        let events = text
            .lines()
            .enumerate()
            .map(|(i, line)| {
                let start = i as u64 * 1500;
                SubtitleEvent::new(start, start + 2000, line)
            })
            .collect();
        Ok(AlignmentOutcome {
            events,
            language: Some(language),
        })
    }
}

struct FakeComposer {
    stats: Arc<Stats>,
}

impl Composer for FakeComposer {
    fn compose(&self, request: &ComposeRequest, output: &Path, _env: &StageEnv) -> StageResult<ComposeOutcome> {
        self.stats.compositions.fetch_add(1, Ordering::SeqCst);
        self.stats.composed_audio.lock().push(request.audio.clone());
        let io = |e| StageError::from_io("fake composer", e, StageError::Composition);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        fs::write(output, b"mp4").map_err(io)?;
        Ok(ComposeOutcome { duration_secs: 4.0 })
    }
}

struct CopyTranscoder {
    stats: Arc<Stats>,
}

impl AudioTranscoder for CopyTranscoder {
    fn transcode(&self, input: &Path, output: &Path, _runner: &ToolRunner) -> Result<(), ToolError> {
        self.stats.transcodes.fetch_add(1, Ordering::SeqCst);
        fs::copy(input, output).map_err(|source| ToolError::Io {
            program: "copy".to_string(),
            source,
        })?;
        Ok(())
    }
}

pub struct Options {
    pub separation_delay: Duration,
    pub max_concurrent_tasks: usize,
    pub separator_instances: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            separation_delay: Duration::ZERO,
            max_concurrent_tasks: 2,
            separator_instances: 1,
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub executor: TaskExecutor,
    pub stats: Arc<Stats>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let dir = tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();

        let mut settings = Settings::default();
        settings.paths.input_cache = path("inputs");
        settings.paths.output_cache = path("cache");
        settings.paths.logs_folder = path("logs");
        settings.executor.max_concurrent_tasks = options.max_concurrent_tasks;
        settings.separation.max_instances = options.separator_instances;

        let stats = Arc::new(Stats::default());
        let separator_stats = Arc::clone(&stats);
        let delay = options.separation_delay;
        let pool = SeparatorPool::with_instances(options.separator_instances, move || {
            Box::new(FakeSeparator {
                stats: Arc::clone(&separator_stats),
                delay,
            }) as Box<dyn SeparationEngine>
        });
        let engines = StageEngines::new(
            pool,
            Arc::new(FakeAligner {
                stats: Arc::clone(&stats),
            }),
            Arc::new(FakeComposer {
                stats: Arc::clone(&stats),
            }),
            Arc::new(CopyTranscoder {
                stats: Arc::clone(&stats),
            }),
        );

        let store = Arc::new(TaskStore::from_settings(&settings));
        let orchestrator = Arc::new(Orchestrator::new(settings, engines));
        let executor = TaskExecutor::new(store, orchestrator);

        Self {
            dir,
            executor,
            stats,
        }
    }

    pub fn store(&self) -> &TaskStore {
        self.executor.store()
    }

    /// Write an upload file outside the caches.
    pub fn upload(&self, name: &str, content: &[u8]) -> PathBuf {
        let uploads = self.dir.path().join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        let path = uploads.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Create a task and import its inputs.
    pub fn submit(&self, mode: ProductionMode, audio: &[u8], lyrics: Option<&str>) -> TaskId {
        let id = self.store().create(mode);
        let audio_path = self.upload(&format!("{}-song.wav", id), audio);
        self.store()
            .import_input(&id, InputKey::Audio, &audio_path)
            .unwrap();
        if let Some(text) = lyrics {
            let lyrics_path = self.upload(&format!("{}-lyrics.txt", id), text.as_bytes());
            self.store()
                .import_input(&id, InputKey::Lyrics, &lyrics_path)
                .unwrap();
        }
        id
    }

    /// Attach a metadata document.
    pub fn metadata(&self, id: &TaskId, json: &str) {
        let path = self.upload(&format!("{}-meta.json", id), json.as_bytes());
        self.store()
            .import_input(id, InputKey::Metadata, &path)
            .unwrap();
    }

    /// Run a task and wait until it is terminal.
    pub async fn run_to_end(&self, id: &TaskId) -> TaskSnapshot {
        let handle = self.executor.run(id).unwrap();
        handle.await.unwrap();
        self.wait(id).await
    }

    pub async fn wait(&self, id: &TaskId) -> TaskSnapshot {
        tokio::time::timeout(
            Duration::from_secs(30),
            self.executor.wait_for_terminal(id, Duration::from_millis(10)),
        )
        .await
        .unwrap()
        .unwrap()
    }
}

pub const LYRICS: &str = "Hello darkness my old friend\n\
I have come to talk with you again\n\
Because a vision softly creeping\n\
Left its seeds while I was sleeping\n";

pub const FRENCH_LYRICS: &str = "Je marchais seul dans la rue pendant la nuit\n\
Les lumières de la ville disparaissaient lentement\n\
Et je pensais encore à toi jusqu'au matin\n";

//! In-memory task store enforcing the lifecycle.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::config::Settings;
use crate::models::{AlignStrategy, ArtifactKind, FailureKind, InputKey, ProductionMode, TaskMetadata, TaskPlan};

use super::types::{TaskError, TaskId, TaskRecord, TaskResult, TaskSnapshot, TaskState};

/// Owner of every task record.
///
/// All transitions go through this type; callers only ever see clones or
/// snapshots.
#[derive(Debug)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
    /// Whether video tasks must upload lyrics before running.
    lyrics_required: bool,
    /// Where imported inputs are copied. `None` keeps caller paths.
    input_cache: Option<PathBuf>,
}

impl TaskStore {
    pub fn new(lyrics_required: bool) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            lyrics_required,
            input_cache: None,
        }
    }

    /// Store matching the configured aligner and input cache.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.alignment.strategy == AlignStrategy::Forced)
            .with_input_cache(&settings.paths.input_cache)
    }

    pub fn with_input_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_cache = Some(dir.into());
        self
    }

    /// Create a task with a fresh id.
    pub fn create(&self, mode: ProductionMode) -> TaskId {
        let mut tasks = self.tasks.write();
        let mut id = TaskId::generate();
        while tasks.contains_key(&id) {
            id = TaskId::generate();
        }
        tasks.insert(id.clone(), TaskRecord::new(id.clone(), mode));
        tracing::debug!(task = %id, "Created task");
        id
    }

    /// Create a task under a caller-chosen id.
    pub fn create_with_id(&self, id: TaskId, mode: ProductionMode) -> TaskResult<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            return Err(TaskError::AlreadyExists(id));
        }
        tasks.insert(id.clone(), TaskRecord::new(id, mode));
        Ok(())
    }

    /// Record an input file for a task.
    ///
    /// A metadata input is parsed immediately and applied to the record;
    /// unparseable metadata is rejected and not stored. Returns the state
    /// after the registration.
    pub fn register_input(&self, id: &TaskId, key: InputKey, path: impl Into<PathBuf>) -> TaskResult<TaskState> {
        let path = path.into();
        let metadata = if key == InputKey::Metadata {
            let content = fs::read_to_string(&path)
                .map_err(|e| TaskError::io(format!("reading {}", path.display()), e))?;
            Some(
                TaskMetadata::from_json(&content).map_err(|e| TaskError::InvalidMetadata {
                    id: id.clone(),
                    message: e.to_string(),
                })?,
            )
        } else {
            None
        };

        self.update(id, |record| {
            if !record.state.accepts_inputs() {
                return Err(TaskError::invalid_state(id, record.state, "add inputs to"));
            }
            if let Some(meta) = metadata {
                if let Some(mode) = meta.production_type {
                    record.production_mode = mode;
                }
                if meta.overlay_text.is_some() {
                    record.overlay_text = meta.overlay_text;
                }
                if meta.language.is_some() {
                    record.language_hint = meta.language;
                }
            }
            record.input_files.insert(key, path);
            self.refresh_readiness(record);
            Ok(record.state)
        })
    }

    /// Copy `source` into the input cache and register the copy.
    ///
    /// Without an input cache the source path is registered as is.
    pub fn import_input(&self, id: &TaskId, key: InputKey, source: &Path) -> TaskResult<TaskState> {
        let Some(ref cache) = self.input_cache else {
            return self.register_input(id, key, source);
        };

        let state = self.snapshot(id)?.state;
        if !state.accepts_inputs() {
            return Err(TaskError::invalid_state(id, state, "add inputs to"));
        }

        let dir = cache.join(crate::logging::sanitize_filename(id.as_str()));
        fs::create_dir_all(&dir)
            .map_err(|e| TaskError::io(format!("creating {}", dir.display()), e))?;
        let mut target = dir.join(key.as_str());
        if let Some(ext) = source.extension() {
            target.set_extension(ext);
        }
        fs::copy(source, &target)
            .map_err(|e| TaskError::io(format!("copying {}", source.display()), e))?;

        self.register_input(id, key, target)
    }

    /// Change the production mode before the task runs.
    pub fn set_mode(&self, id: &TaskId, mode: ProductionMode) -> TaskResult<TaskState> {
        self.update(id, |record| {
            if !record.state.accepts_inputs() {
                return Err(TaskError::invalid_state(id, record.state, "change the mode of"));
            }
            record.production_mode = mode;
            self.refresh_readiness(record);
            Ok(record.state)
        })
    }

    /// `Uploaded → Processing`, returning the plan to run.
    pub fn begin_processing(&self, id: &TaskId) -> TaskResult<TaskPlan> {
        self.update(id, |record| {
            if record.state != TaskState::Uploaded {
                return Err(TaskError::invalid_state(id, record.state, "start"));
            }
            let plan = record
                .plan()
                .ok_or_else(|| TaskError::invalid_state(id, record.state, "start"))?;
            record.state = TaskState::Processing;
            Ok(plan)
        })
    }

    /// Note which step is running.
    pub fn set_current_step(&self, id: &TaskId, step: &str) {
        let updated = self.update(id, |record| {
            if record.state.is_in_flight() {
                record.current_step = Some(step.to_string());
            }
            Ok(())
        });
        if let Err(e) = updated {
            tracing::debug!(task = %id, "Could not record step {}: {}", step, e);
        }
    }

    /// Record a successful run.
    ///
    /// A task whose cancellation was requested ends `Cancelled` instead and
    /// its results are dropped. Returns the final state.
    pub fn complete(&self, id: &TaskId, results: BTreeMap<ArtifactKind, PathBuf>) -> TaskResult<TaskState> {
        self.update(id, |record| {
            match record.state {
                TaskState::Processing if results.is_empty() => {
                    record.state = TaskState::Failed;
                    record.failure_kind = Some(FailureKind::Internal);
                    record.error_message = Some("run produced no results".to_string());
                }
                TaskState::Processing => {
                    record.state = TaskState::Completed;
                    record.results = results;
                }
                TaskState::Cancelling => record.state = TaskState::Cancelled,
                state => return Err(TaskError::invalid_state(id, state, "complete")),
            }
            record.current_step = None;
            Ok(record.state)
        })
    }

    /// Record a failed run. A cancelling task ends `Cancelled` instead.
    pub fn fail(&self, id: &TaskId, kind: FailureKind, message: impl Into<String>) -> TaskResult<TaskState> {
        let message = message.into();
        self.update(id, |record| {
            match record.state {
                TaskState::Processing => {
                    record.state = TaskState::Failed;
                    record.failure_kind = Some(kind);
                    record.error_message = Some(message);
                }
                TaskState::Cancelling => record.state = TaskState::Cancelled,
                state => return Err(TaskError::invalid_state(id, state, "fail")),
            }
            record.current_step = None;
            Ok(record.state)
        })
    }

    /// Request cancellation: `Processing → Cancelling`.
    ///
    /// Asking again while cancelling is a no-op.
    pub fn cancel(&self, id: &TaskId) -> TaskResult<TaskState> {
        self.update(id, |record| match record.state {
            TaskState::Processing => {
                record.state = TaskState::Cancelling;
                Ok(record.state)
            }
            TaskState::Cancelling => Ok(record.state),
            state => Err(TaskError::invalid_state(id, state, "cancel")),
        })
    }

    /// The pipeline stopped after a cancel request.
    pub fn mark_cancelled(&self, id: &TaskId) -> TaskResult<TaskState> {
        self.update(id, |record| {
            if !record.state.is_in_flight() {
                return Err(TaskError::invalid_state(id, record.state, "mark cancelled"));
            }
            record.state = TaskState::Cancelled;
            record.current_step = None;
            Ok(record.state)
        })
    }

    /// Remove a task that is not running.
    ///
    /// With `remove_artifacts` the task's result files are deleted too.
    /// Cache artifacts other tasks may share are left alone.
    pub fn delete(&self, id: &TaskId, remove_artifacts: bool) -> TaskResult<TaskRecord> {
        let record = {
            let mut tasks = self.tasks.write();
            let state = tasks
                .get(id)
                .map(|r| r.state)
                .ok_or_else(|| TaskError::NotFound(id.clone()))?;
            if state.is_in_flight() {
                return Err(TaskError::invalid_state(id, state, "delete"));
            }
            tasks
                .remove(id)
                .ok_or_else(|| TaskError::NotFound(id.clone()))?
        };

        if remove_artifacts {
            for path in record.results.values() {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(task = %id, "Could not remove {}: {}", path.display(), e),
                }
            }
        }
        tracing::debug!(task = %id, "Deleted task");
        Ok(record)
    }

    pub fn snapshot(&self, id: &TaskId) -> TaskResult<TaskSnapshot> {
        self.tasks
            .read()
            .get(id)
            .map(TaskSnapshot::from)
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    /// Full copy of a record.
    pub fn record(&self, id: &TaskId) -> TaskResult<TaskRecord> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    /// Task ids, oldest first.
    pub fn list(&self) -> Vec<TaskId> {
        let tasks = self.tasks.read();
        let mut records: Vec<&TaskRecord> = tasks.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records.into_iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    fn update<T>(
        &self,
        id: &TaskId,
        change: impl FnOnce(&mut TaskRecord) -> TaskResult<T>,
    ) -> TaskResult<T> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;
        let before = record.state;
        let value = change(record)?;
        record.touch();
        if record.state != before {
            tracing::info!(task = %id, "Task {} -> {}", before, record.state);
        }
        Ok(value)
    }

    fn refresh_readiness(&self, record: &mut TaskRecord) {
        record.state = if record.missing_inputs(self.lyrics_required).is_empty() {
            TaskState::Uploaded
        } else {
            TaskState::Pending
        };
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn uploaded(store: &TaskStore, mode: ProductionMode) -> TaskId {
        let id = store.create(mode);
        store.register_input(&id, InputKey::Audio, "/in/song.wav").unwrap();
        store.register_input(&id, InputKey::Lyrics, "/in/lyrics.txt").unwrap();
        id
    }

    fn video_results() -> BTreeMap<ArtifactKind, PathBuf> {
        BTreeMap::from([
            (ArtifactKind::Video, PathBuf::from("/c/video.mp4")),
            (ArtifactKind::Subtitle, PathBuf::from("/c/subtitle.srt")),
        ])
    }

    #[test]
    fn inputs_move_pending_to_uploaded() {
        let store = TaskStore::new(true);
        let id = store.create(ProductionMode::MusicVideo);
        assert_eq!(store.snapshot(&id).unwrap().state, TaskState::Pending);

        let state = store.register_input(&id, InputKey::Audio, "/in/a.wav").unwrap();
        assert_eq!(state, TaskState::Pending);
        let state = store.register_input(&id, InputKey::Lyrics, "/in/l.txt").unwrap();
        assert_eq!(state, TaskState::Uploaded);
    }

    #[test]
    fn stems_only_needs_audio_alone() {
        let store = TaskStore::new(true);
        let id = store.create(ProductionMode::StemsOnly);
        let state = store.register_input(&id, InputKey::Audio, "/in/a.wav").unwrap();
        assert_eq!(state, TaskState::Uploaded);
    }

    #[test]
    fn begin_processing_only_from_uploaded() {
        let store = TaskStore::new(true);
        let id = store.create(ProductionMode::MusicVideo);
        assert!(matches!(
            store.begin_processing(&id),
            Err(TaskError::InvalidState { state: TaskState::Pending, .. })
        ));

        store.register_input(&id, InputKey::Audio, "/in/a.wav").unwrap();
        store.register_input(&id, InputKey::Lyrics, "/in/l.txt").unwrap();
        let plan = store.begin_processing(&id).unwrap();
        assert_eq!(plan.audio, PathBuf::from("/in/a.wav"));

        // A second start is rejected, never queued
        assert!(matches!(
            store.begin_processing(&id),
            Err(TaskError::InvalidState { state: TaskState::Processing, .. })
        ));
        assert!(store.register_input(&id, InputKey::Background, "/in/b.png").is_err());
    }

    #[test]
    fn completion_records_results() {
        let store = TaskStore::new(true);
        let id = uploaded(&store, ProductionMode::MusicVideo);
        store.begin_processing(&id).unwrap();
        store.set_current_step(&id, "Align");
        assert_eq!(store.snapshot(&id).unwrap().current_step.as_deref(), Some("Align"));

        assert_eq!(store.complete(&id, video_results()).unwrap(), TaskState::Completed);
        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.results.len(), 2);
        assert!(snap.error_message.is_none());
        assert!(snap.current_step.is_none());

        // Terminal states never change
        assert!(store.fail(&id, FailureKind::Internal, "late").is_err());
        assert!(store.cancel(&id).is_err());
    }

    #[test]
    fn failure_records_kind_and_message() {
        let store = TaskStore::new(true);
        let id = uploaded(&store, ProductionMode::MusicVideo);
        store.begin_processing(&id).unwrap();

        store
            .fail(&id, FailureKind::UnsupportedLanguage, "language fra")
            .unwrap();
        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.state, TaskState::Failed);
        assert_eq!(snap.failure_kind, Some(FailureKind::UnsupportedLanguage));
        assert!(snap.results.is_empty());
    }

    #[test]
    fn cancel_wins_over_late_completion() {
        let store = TaskStore::new(true);
        let id = uploaded(&store, ProductionMode::MusicVideo);
        assert!(store.cancel(&id).is_err());

        store.begin_processing(&id).unwrap();
        assert_eq!(store.cancel(&id).unwrap(), TaskState::Cancelling);
        assert_eq!(store.cancel(&id).unwrap(), TaskState::Cancelling);

        assert_eq!(store.complete(&id, video_results()).unwrap(), TaskState::Cancelled);
        assert!(store.snapshot(&id).unwrap().results.is_empty());
    }

    #[test]
    fn delete_rejected_while_in_flight() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("video.mp4");
        fs::write(&video, b"v").unwrap();

        let store = TaskStore::new(true);
        let id = uploaded(&store, ProductionMode::MusicVideo);
        store.begin_processing(&id).unwrap();
        assert!(matches!(
            store.delete(&id, true),
            Err(TaskError::InvalidState { .. })
        ));

        store
            .complete(&id, BTreeMap::from([(ArtifactKind::Video, video.clone())]))
            .unwrap();
        store.delete(&id, true).unwrap();
        assert!(!video.exists());
        assert!(matches!(store.snapshot(&id), Err(TaskError::NotFound(_))));
    }

    #[test]
    fn metadata_sets_mode_and_hints() {
        let dir = tempdir().unwrap();
        let meta = dir.path().join("meta.json");
        fs::write(
            &meta,
            r#"{"production_type": "separate_audio", "overlay_text": "", "language": "rus"}"#,
        )
        .unwrap();

        let store = TaskStore::new(true);
        let id = store.create(ProductionMode::MusicVideo);
        store.register_input(&id, InputKey::Audio, "/in/a.wav").unwrap();
        let state = store.register_input(&id, InputKey::Metadata, &meta).unwrap();

        // Stems only needs no lyrics, so the task is ready
        assert_eq!(state, TaskState::Uploaded);
        let record = store.record(&id).unwrap();
        assert_eq!(record.production_mode, ProductionMode::StemsOnly);
        assert_eq!(record.overlay_text.as_deref(), Some(""));
        assert_eq!(record.language_hint.as_deref(), Some("rus"));
    }

    #[test]
    fn bad_metadata_is_rejected() {
        let dir = tempdir().unwrap();
        let meta = dir.path().join("meta.json");
        fs::write(&meta, "{not json").unwrap();

        let store = TaskStore::new(true);
        let id = store.create(ProductionMode::MusicVideo);
        assert!(matches!(
            store.register_input(&id, InputKey::Metadata, &meta),
            Err(TaskError::InvalidMetadata { .. })
        ));
        assert!(store.record(&id).unwrap().input_files.is_empty());
    }

    #[test]
    fn import_copies_into_input_cache() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("upload.flac");
        fs::write(&source, b"flac").unwrap();

        let store = TaskStore::new(false).with_input_cache(dir.path().join("inputs"));
        let id = store.create(ProductionMode::KaraokeVideo);
        let state = store.import_input(&id, InputKey::Audio, &source).unwrap();
        assert_eq!(state, TaskState::Uploaded);

        let audio = store.record(&id).unwrap().input_files[&InputKey::Audio].clone();
        assert!(audio.starts_with(dir.path().join("inputs")));
        assert_eq!(audio.file_name().unwrap(), "audio.flac");
        assert_eq!(fs::read(audio).unwrap(), b"flac");
    }

    #[test]
    fn step_updates_for_unknown_tasks_are_ignored() {
        let store = TaskStore::new(true);
        store.set_current_step(&TaskId::new("ghost"), "Separate");
        assert!(store.is_empty());
    }

    #[test]
    fn list_is_in_creation_order() {
        let store = TaskStore::new(true);
        let a = TaskId::from("a-task");
        let b = TaskId::from("b-task");
        store.create_with_id(b.clone(), ProductionMode::MusicVideo).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.create_with_id(a.clone(), ProductionMode::MusicVideo).unwrap();

        assert_eq!(store.list(), vec![b.clone(), a]);
        assert!(matches!(
            store.create_with_id(b, ProductionMode::StemsOnly),
            Err(TaskError::AlreadyExists(_))
        ));
        assert_eq!(store.len(), 2);
    }
}

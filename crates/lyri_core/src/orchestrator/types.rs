//! Core types for the orchestrator pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::artifacts::{ArtifactPathResolver, BaseName};
use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::logging::TaskLogger;
use crate::models::{ArtifactKind, ProductionMode, Stage, TaskPlan};
use crate::stages::StageEnv;

use super::engines::StageEngines;

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (step_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Cache bases for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBases {
    /// Derived from the audio and the separation model. Used by the
    /// prepare, separate and deliver stages.
    pub audio: BaseName,
    /// Derived from every input and setting that shapes the video.
    /// Used by the align and compose stages.
    pub render: BaseName,
}

/// Read-only context passed to pipeline steps.
///
/// Mutable state goes in `RunState`.
pub struct Context {
    pub plan: TaskPlan,
    pub settings: Arc<Settings>,
    pub engines: StageEngines,
    pub resolver: ArtifactPathResolver,
    pub bases: ArtifactBases,
    /// Per-task logger.
    pub logger: Arc<TaskLogger>,
    pub cancel: CancelToken,
    /// Bound on each subprocess and pool wait.
    pub stage_timeout: Option<Duration>,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    pub fn new(
        plan: TaskPlan,
        settings: Arc<Settings>,
        engines: StageEngines,
        resolver: ArtifactPathResolver,
        bases: ArtifactBases,
        logger: Arc<TaskLogger>,
        cancel: CancelToken,
    ) -> Self {
        let stage_timeout = settings.executor.stage_timeout();
        Self {
            plan,
            settings,
            engines,
            resolver,
            bases,
            logger,
            cancel,
            stage_timeout,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, step_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(step_name, percent, message);
        }
    }

    pub fn task_id(&self) -> &str {
        &self.plan.task_id
    }

    /// Environment handed to stage engines.
    pub fn env(&self) -> StageEnv<'_> {
        StageEnv::new(&self.logger, &self.cancel, self.stage_timeout)
    }

    /// Cache base that owns a stage's artifacts.
    pub fn base_for(&self, stage: Stage) -> &BaseName {
        match stage {
            Stage::Prepare | Stage::Separate | Stage::Deliver => &self.bases.audio,
            Stage::Align | Stage::Compose => &self.bases.render,
        }
    }

    /// Resolved path of one artifact.
    pub fn artifact(&self, stage: Stage, kind: ArtifactKind) -> PathBuf {
        self.resolver.resolve(self.base_for(stage), stage, kind)
    }

    /// Fresh private directory for engine files, unique to this call.
    pub fn scratch_dir(&self, stage: Stage) -> PathBuf {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.resolver.scratch_dir(self.base_for(stage), stage, &token)
    }
}

/// Mutable state that accumulates results from pipeline steps.
///
/// Each step's output is stored in its own section and is written once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub task_id: String,
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separation: Option<SeparationOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composition: Option<CompositionOutput>,
}

impl RunState {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        }
    }

    /// Deliverables for the given mode, or `None` when a step that mode
    /// needs has not recorded its output.
    pub fn results(&self, mode: ProductionMode) -> Option<BTreeMap<ArtifactKind, PathBuf>> {
        let mut results = BTreeMap::new();
        if mode.produces_video() {
            let alignment = self.alignment.as_ref()?;
            let composition = self.composition.as_ref()?;
            results.insert(ArtifactKind::Video, composition.video.clone());
            results.insert(ArtifactKind::Subtitle, alignment.subtitle.clone());
        } else {
            let delivery = self.delivery.as_ref()?;
            results.insert(ArtifactKind::Audio, delivery.audio.clone());
            results.insert(ArtifactKind::Vocal, delivery.vocal.clone());
            results.insert(ArtifactKind::Instrumental, delivery.instrumental.clone());
        }
        Some(results)
    }
}

/// Output from the Separate step.
#[derive(Debug, Clone, Serialize)]
pub struct SeparationOutput {
    pub vocal: PathBuf,
    pub instrumental: PathBuf,
    /// Both stems were found in the cache.
    pub reused: bool,
}

/// Output from the DeliverStems step.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutput {
    pub audio: PathBuf,
    pub vocal: PathBuf,
    pub instrumental: PathBuf,
}

/// Output from the Align step.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentOutput {
    pub subtitle: PathBuf,
    /// Detected or hinted language; unknown when reused from cache.
    pub language: Option<String>,
    pub reused: bool,
}

/// Output from the Compose step.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionOutput {
    pub video: PathBuf,
    pub reused: bool,
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step does not apply to this task (not an error).
    Skipped(String),
}

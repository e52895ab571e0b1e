//! Pipeline orchestrator for running one task end to end.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Step: Separate       (every mode)
//!     ├── Step: DeliverStems   (stems only)
//!     ├── Step: Align          (video modes)
//!     └── Step: Compose        (video modes)
//! ```
//!
//! Every step resolves its outputs through the artifact resolver and
//! reuses them when they already exist, so rerunning a task with the same
//! inputs invokes no engine at all.
//!
//! # Example
//!
//! ```ignore
//! use lyri_core::orchestrator::{Orchestrator, StageEngines};
//!
//! let engines = StageEngines::from_settings(&settings);
//! let orchestrator = Orchestrator::new(settings, engines);
//! let output = orchestrator.run(&plan, logger, CancelToken::new())?;
//! println!("Results: {:?}", output.results);
//! ```

mod engines;
mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::{ArtifactPathResolver, BaseName, Fingerprint};
use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::logging::TaskLogger;
use crate::models::{ArtifactKind, TaskPlan};

pub use engines::StageEngines;
pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{AlignStep, ComposeStep, DeliverStemsStep, SeparateStep};
pub use types::{
    AlignmentOutput, ArtifactBases, CompositionOutput, Context, DeliveryOutput, ProgressCallback,
    RunState, SeparationOutput, StepOutcome,
};

/// Create the pipeline with all steps in order.
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(SeparateStep::new())
        .with_step(DeliverStemsStep::new())
        .with_step(AlignStep::new())
        .with_step(ComposeStep::new())
}

/// Derive the cache bases for a plan.
///
/// The audio base covers the audio bytes and the separation setup. The
/// render base covers the audio base plus everything that changes the
/// subtitles or the video.
pub fn artifact_bases(plan: &TaskPlan, settings: &Settings) -> io::Result<ArtifactBases> {
    let stem = plan.audio_stem();
    let separation = &settings.separation;

    let audio_digest = Fingerprint::new()
        .file("audio", &plan.audio)?
        .field("separator", &separation.command.join(" "))
        .field("model", &separation.model_path)
        .field("labels", &format!("{}|{}", separation.vocal_label, separation.instrumental_label))
        .finish();
    let audio = BaseName::new(&stem, &audio_digest);

    let alignment = &settings.alignment;
    let composition = &settings.composition;
    let background = plan.background.clone().or_else(|| {
        settings
            .paths
            .default_background_path()
            .filter(|p| p.is_file())
    });
    let (width, height) = composition.target_resolution();
    let overlay = plan
        .overlay_text
        .as_deref()
        .unwrap_or(&composition.overlay_text);

    let render_digest = Fingerprint::new()
        .field("audio_base", audio.as_str())
        .field("mode", plan.mode.as_str())
        .optional_file("lyrics", plan.lyrics.as_deref())?
        .optional_file("background", background.as_deref())?
        .optional("language", plan.language_hint.as_deref())
        .field("overlay", overlay)
        .field(
            "alignment",
            &format!(
                "{:?}|{}|{}|{}|{}|{}|{}",
                alignment.strategy,
                alignment.forced_command.join(" "),
                alignment.config_string,
                alignment.default_language,
                alignment.allowed_languages.join(","),
                alignment.recognition_command.join(" "),
                alignment.recognition_model,
            ),
        )
        .field(
            "composition",
            &format!(
                "{}x{}|{}|{}",
                width, height, composition.preset, composition.default_frame_rate
            ),
        )
        .finish();
    let render = BaseName::new(&stem, &render_digest);

    Ok(ArtifactBases { audio, render })
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Deliverables keyed by kind: `{audio, vocal, instrumental}` for stems
    /// only, `{video, subtitle}` for video modes.
    pub results: BTreeMap<ArtifactKind, PathBuf>,
    /// Lyrics language, when alignment ran in this run.
    pub language: Option<String>,
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
}

/// Runs tasks through the standard pipeline against one engine set.
///
/// Shared by every task of a process; `run` is called from blocking
/// worker threads concurrently.
pub struct Orchestrator {
    settings: Arc<Settings>,
    engines: StageEngines,
    resolver: ArtifactPathResolver,
    pipeline: Pipeline,
}

impl Orchestrator {
    pub fn new(settings: Settings, engines: StageEngines) -> Self {
        let resolver = ArtifactPathResolver::new(
            &settings.paths.output_cache,
            &settings.composition.delivery_format,
        );
        Self {
            settings: Arc::new(settings),
            engines,
            resolver,
            pipeline: create_standard_pipeline(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> &ArtifactPathResolver {
        &self.resolver
    }

    pub fn engines(&self) -> &StageEngines {
        &self.engines
    }

    /// Run one task to completion, failure or cancellation.
    pub fn run(
        &self,
        plan: &TaskPlan,
        logger: Arc<TaskLogger>,
        cancel: CancelToken,
    ) -> PipelineResult<PipelineOutput> {
        self.run_with_progress(plan, logger, cancel, None)
    }

    /// Like `run`, reporting each step start to `progress`.
    pub fn run_with_progress(
        &self,
        plan: &TaskPlan,
        logger: Arc<TaskLogger>,
        cancel: CancelToken,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<PipelineOutput> {
        logger.info(&format!(
            "Task {}: {} from {}",
            plan.task_id,
            plan.mode.as_str(),
            plan.audio.display()
        ));

        let bases = artifact_bases(plan, &self.settings).map_err(|e| {
            logger.error(&format!("Could not read task inputs: {}", e));
            PipelineError::setup_failed(&plan.task_id, format!("reading inputs: {}", e))
        })?;
        logger.debug(&format!(
            "Cache bases: audio={} render={}",
            bases.audio, bases.render
        ));

        let mut ctx = Context::new(
            plan.clone(),
            Arc::clone(&self.settings),
            self.engines.clone(),
            self.resolver.clone(),
            bases,
            logger,
            cancel,
        );
        if let Some(callback) = progress {
            ctx = ctx.with_progress_callback(callback);
        }

        let mut state = RunState::new(&plan.task_id);
        let run = self.pipeline.run(&ctx, &mut state)?;

        let results = state.results(plan.mode).ok_or_else(|| {
            PipelineError::validation_failed(&plan.task_id, "pipeline finished without its deliverables")
        })?;
        for (kind, path) in &results {
            ctx.logger
                .info(&format!("Result {}: {}", kind.as_str(), path.display()));
        }

        Ok(PipelineOutput {
            results,
            language: state.alignment.and_then(|a| a.language),
            steps_completed: run.steps_completed,
            steps_skipped: run.steps_skipped,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("output_root", &self.resolver.output_root())
            .field("steps", &self.pipeline.step_names())
            .finish()
    }
}

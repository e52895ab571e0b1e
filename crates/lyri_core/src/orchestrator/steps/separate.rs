//! Separate step - splits the mixed audio into vocal and instrumental stems.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{commit, ensure_parent, partial_path, ArtifactPathResolver};
use crate::models::{ArtifactKind, Stage};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, SeparationOutput, StepOutcome};
use crate::stages::{install_stems, select_stems, StageError};
use crate::tools::has_extension;

/// Runs for every production mode.
///
/// Non-WAV input is first converted to WAV under the prepare stage. The
/// separation itself runs in a private scratch directory on an engine
/// borrowed from the pool, and only the two selected stems are moved into
/// the cache.
pub struct SeparateStep;

impl SeparateStep {
    pub fn new() -> Self {
        Self
    }

    /// WAV copy of the task audio, converting and caching it when needed.
    fn prepared_audio(&self, ctx: &Context) -> StepResult<PathBuf> {
        if has_extension(&ctx.plan.audio, "wav") {
            return Ok(ctx.plan.audio.clone());
        }

        let target = ctx.artifact(Stage::Prepare, ArtifactKind::PreparedAudio);
        if ArtifactPathResolver::is_cached(&target) {
            ctx.logger
                .cached(&format!("Prepared audio {}", target.display()));
            return Ok(target);
        }

        ctx.logger.info("Converting input audio to WAV");
        let partial = partial_path(&target);
        ensure_parent(&partial)
            .map_err(|e| StageError::from_io("creating prepare directory", e, StageError::Transcode))?;

        let env = ctx.env();
        if let Err(e) = ctx
            .engines
            .transcoder
            .transcode(&ctx.plan.audio, &partial, &env.runner())
        {
            let _ = fs::remove_file(&partial);
            return Err(StageError::from_tool(e, StageError::Transcode).into());
        }
        commit(&partial, &target)
            .map_err(|e| StageError::from_io("storing prepared audio", e, StageError::Transcode))?;

        Ok(target)
    }

    /// Separate on a pooled engine. Returns `false` when another task
    /// installed the stems while this one waited for the engine.
    fn separate(&self, ctx: &Context, mixed: &Path, vocal: &Path, instrumental: &Path) -> StepResult<bool> {
        let env = ctx.env();
        let mut engine = ctx.engines.separators.checkout(&env)?;
        env.check_cancelled()?;

        if stems_cached(vocal, instrumental) {
            return Ok(false);
        }

        let scratch = ctx.scratch_dir(Stage::Separate);
        let outcome = engine
            .separate(mixed, &scratch, &env)
            .and_then(|stems| select_stems(&stems, &ctx.logger))
            .and_then(|(vocal_src, instrumental_src)| {
                install_stems(&vocal_src, &instrumental_src, vocal, instrumental)
                    .map_err(|e| StageError::from_io("installing stems", e, StageError::Separation))
            });
        drop(engine);

        if scratch.exists() {
            if let Err(e) = fs::remove_dir_all(&scratch) {
                ctx.logger
                    .warn(&format!("Could not remove {}: {}", scratch.display(), e));
            }
        }

        outcome.map(|()| true).map_err(StepError::from)
    }
}

fn stems_cached(vocal: &Path, instrumental: &Path) -> bool {
    ArtifactPathResolver::is_cached(vocal) && ArtifactPathResolver::is_cached(instrumental)
}

impl Default for SeparateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for SeparateStep {
    fn name(&self) -> &str {
        "Separate"
    }

    fn description(&self) -> &str {
        "Separate vocal and instrumental stems"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if !ctx.plan.audio.is_file() {
            return Err(StepError::file_not_found(ctx.plan.audio.display().to_string()));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let vocal = ctx.artifact(Stage::Separate, ArtifactKind::Vocal);
        let instrumental = ctx.artifact(Stage::Separate, ArtifactKind::Instrumental);

        let reused = stems_cached(&vocal, &instrumental) || {
            let mixed = self.prepared_audio(ctx)?;
            !self.separate(ctx, &mixed, &vocal, &instrumental)?
        };
        if reused {
            ctx.logger.cached(&format!(
                "Stems {} and {}",
                vocal.display(),
                instrumental.display()
            ));
        } else {
            ctx.logger.info(&format!("Vocal stem: {}", vocal.display()));
            ctx.logger
                .info(&format!("Instrumental stem: {}", instrumental.display()));
        }

        state.separation = Some(SeparationOutput {
            vocal,
            instrumental,
            reused,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        let separation = state
            .separation
            .as_ref()
            .ok_or_else(|| StepError::invalid_output("separation not recorded"))?;
        for stem in [&separation.vocal, &separation.instrumental] {
            if !ArtifactPathResolver::is_cached(stem) {
                return Err(StepError::invalid_output(format!(
                    "stem missing: {}",
                    stem.display()
                )));
            }
        }
        Ok(())
    }
}

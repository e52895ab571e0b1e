//! Align step - times the lyrics against the vocal stem.

use std::fs;

use crate::artifacts::ArtifactPathResolver;
use crate::models::{ArtifactKind, Stage};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{AlignmentOutput, Context, RunState, StepOutcome};
use crate::stages::{write_subtitles, AlignRequest, StageError};

/// Writes the normalized subtitle artifact for video tasks.
pub struct AlignStep;

impl AlignStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AlignStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for AlignStep {
    fn name(&self) -> &str {
        "Align"
    }

    fn description(&self) -> &str {
        "Align lyrics to vocals"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if !ctx.plan.mode.produces_video() || !ctx.engines.aligner.needs_lyrics() {
            return Ok(());
        }
        match ctx.plan.lyrics {
            Some(ref lyrics) if lyrics.is_file() => Ok(()),
            Some(ref lyrics) => Err(StepError::file_not_found(lyrics.display().to_string())),
            None => Err(StepError::invalid_input(format!(
                "{} alignment needs a lyrics file",
                ctx.engines.aligner.name()
            ))),
        }
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        if !ctx.plan.mode.produces_video() {
            return Ok(StepOutcome::Skipped("stems only".to_string()));
        }

        let subtitle = ctx.artifact(Stage::Align, ArtifactKind::Subtitle);
        if ArtifactPathResolver::is_cached(&subtitle) {
            ctx.logger.cached(&format!("Subtitles {}", subtitle.display()));
            state.alignment = Some(AlignmentOutput {
                subtitle,
                language: None,
                reused: true,
            });
            return Ok(StepOutcome::Success);
        }

        let separation = state
            .separation
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("vocal stem not separated"))?;

        let request = AlignRequest {
            vocal: separation.vocal.clone(),
            lyrics: ctx.plan.lyrics.clone(),
            language_hint: ctx.plan.language_hint.clone(),
            work_dir: ctx.scratch_dir(Stage::Align),
        };
        ctx.logger
            .info(&format!("Aligning with {} strategy", ctx.engines.aligner.name()));

        let env = ctx.env();
        let aligned = ctx.engines.aligner.align(&request, &env);
        if request.work_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&request.work_dir) {
                ctx.logger.warn(&format!(
                    "Could not remove {}: {}",
                    request.work_dir.display(),
                    e
                ));
            }
        }
        let outcome = aligned?;

        let written = write_subtitles(outcome.events, &subtitle)
            .map_err(|e| StageError::from_io("writing subtitles", e, StageError::Alignment))?;
        if written == 0 {
            let _ = fs::remove_file(&subtitle);
            return Err(StageError::alignment("no subtitle events with text").into());
        }
        ctx.logger
            .info(&format!("Wrote {} subtitle events", written));

        state.alignment = Some(AlignmentOutput {
            subtitle,
            language: outcome.language,
            reused: false,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        let alignment = state
            .alignment
            .as_ref()
            .ok_or_else(|| StepError::invalid_output("alignment not recorded"))?;
        if !ArtifactPathResolver::is_cached(&alignment.subtitle) {
            return Err(StepError::invalid_output(format!(
                "subtitle missing: {}",
                alignment.subtitle.display()
            )));
        }
        Ok(())
    }
}

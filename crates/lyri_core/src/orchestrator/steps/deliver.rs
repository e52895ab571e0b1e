//! DeliverStems step - hands out the original mix and both stems in the
//! delivery format.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{commit, ensure_parent, partial_path, ArtifactPathResolver};
use crate::models::{ArtifactKind, ProductionMode, Stage};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, DeliveryOutput, RunState, StepOutcome};
use crate::stages::StageError;
use crate::tools::has_extension;

/// Stems-only tasks end here.
///
/// A source already in the delivery format is copied byte for byte;
/// anything else goes through the transcoder.
pub struct DeliverStemsStep;

impl DeliverStemsStep {
    pub fn new() -> Self {
        Self
    }

    fn deliver(&self, ctx: &Context, source: &Path, kind: ArtifactKind) -> StepResult<PathBuf> {
        let target = ctx.artifact(Stage::Deliver, kind);
        if ArtifactPathResolver::is_cached(&target) {
            ctx.logger
                .cached(&format!("{} {}", kind.as_str(), target.display()));
            return Ok(target);
        }

        let partial = partial_path(&target);
        ensure_parent(&partial)
            .map_err(|e| StageError::from_io("creating delivery directory", e, StageError::Transcode))?;

        if has_extension(source, ctx.resolver.delivery_format()) {
            if let Err(e) = fs::copy(source, &partial) {
                let _ = fs::remove_file(&partial);
                return Err(StageError::from_io("copying stem", e, StageError::Transcode).into());
            }
        } else {
            let env = ctx.env();
            if let Err(e) = ctx
                .engines
                .transcoder
                .transcode(source, &partial, &env.runner())
            {
                let _ = fs::remove_file(&partial);
                return Err(StageError::from_tool(e, StageError::Transcode).into());
            }
        }

        commit(&partial, &target)
            .map_err(|e| StageError::from_io("storing delivered stem", e, StageError::Transcode))?;
        Ok(target)
    }
}

impl Default for DeliverStemsStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for DeliverStemsStep {
    fn name(&self) -> &str {
        "DeliverStems"
    }

    fn description(&self) -> &str {
        "Deliver audio stems"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if ctx.plan.mode == ProductionMode::StemsOnly && !ctx.plan.audio.is_file() {
            return Err(StepError::file_not_found(ctx.plan.audio.display().to_string()));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        if ctx.plan.mode != ProductionMode::StemsOnly {
            return Ok(StepOutcome::Skipped("video production".to_string()));
        }

        let separation = state
            .separation
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("stems not separated"))?;

        let audio = self.deliver(ctx, &ctx.plan.audio, ArtifactKind::Audio)?;
        ctx.env().check_cancelled()?;
        let vocal = self.deliver(ctx, &separation.vocal, ArtifactKind::Vocal)?;
        ctx.env().check_cancelled()?;
        let instrumental = self.deliver(ctx, &separation.instrumental, ArtifactKind::Instrumental)?;

        state.delivery = Some(DeliveryOutput {
            audio,
            vocal,
            instrumental,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        let delivery = state
            .delivery
            .as_ref()
            .ok_or_else(|| StepError::invalid_output("delivery not recorded"))?;
        for path in [&delivery.audio, &delivery.vocal, &delivery.instrumental] {
            if !ArtifactPathResolver::is_cached(path) {
                return Err(StepError::invalid_output(format!(
                    "delivered file missing: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::steps::SeparateStep;
    use crate::orchestrator::testing::{FakeSeparator, TestRig};

    fn separated(rig: &TestRig) -> RunState {
        let mut state = RunState::new("t");
        SeparateStep.execute(&rig.ctx, &mut state).unwrap();
        state
    }

    #[test]
    fn delivers_three_files_in_delivery_format() {
        let rig = TestRig::new(ProductionMode::StemsOnly);
        let mut state = separated(&rig);

        let outcome = DeliverStemsStep.execute(&rig.ctx, &mut state).unwrap();
        assert_eq!(outcome, StepOutcome::Success);
        DeliverStemsStep.validate_output(&rig.ctx, &state).unwrap();

        let delivery = state.delivery.unwrap();
        for path in [&delivery.audio, &delivery.vocal, &delivery.instrumental] {
            assert!(has_extension(path, "mp3"), "{}", path.display());
        }
        assert_eq!(rig.transcoder.calls(), 3);
    }

    #[test]
    fn matching_format_is_copied() {
        let rig = TestRig::build(ProductionMode::StemsOnly, "song.mp3", FakeSeparator::tagged());
        let mut state = separated(&rig);
        // One conversion to WAV for separation
        assert_eq!(rig.transcoder.calls(), 1);

        DeliverStemsStep.execute(&rig.ctx, &mut state).unwrap();
        let delivery = state.delivery.unwrap();

        assert_eq!(fs::read(&delivery.audio).unwrap(), fs::read(&rig.ctx.plan.audio).unwrap());
        // Stems are WAV and still need encoding
        assert_eq!(rig.transcoder.calls(), 3);
    }

    #[test]
    fn video_modes_skip_delivery() {
        let rig = TestRig::new(ProductionMode::MusicVideo);
        let mut state = separated(&rig);

        let outcome = DeliverStemsStep.execute(&rig.ctx, &mut state).unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped(_)));
        assert!(state.delivery.is_none());
    }

    #[test]
    fn requires_separation() {
        let rig = TestRig::new(ProductionMode::StemsOnly);
        let mut state = RunState::new("t");
        assert!(matches!(
            DeliverStemsStep.execute(&rig.ctx, &mut state),
            Err(StepError::PreconditionFailed(_))
        ));
    }
}

//! Compose step - renders the subtitle video.

use crate::artifacts::ArtifactPathResolver;
use crate::models::{ArtifactKind, ProductionMode, Stage};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{CompositionOutput, Context, RunState, StepOutcome};
use crate::stages::{Background, ComposeRequest};

/// Burns the subtitles over the background, with the full mix as the
/// soundtrack for music videos and the instrumental for karaoke.
pub struct ComposeStep;

impl ComposeStep {
    pub fn new() -> Self {
        Self
    }

    /// Overlay text for this task. An empty override turns it off.
    pub fn overlay_text(ctx: &Context) -> Option<String> {
        let text = ctx
            .plan
            .overlay_text
            .as_deref()
            .unwrap_or(&ctx.settings.composition.overlay_text);
        if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// Background for this task, falling back to the configured default.
    pub fn background(ctx: &Context) -> Background {
        let default = ctx.settings.paths.default_background_path();
        Background::resolve(ctx.plan.background.as_deref(), default.as_deref())
    }
}

impl Default for ComposeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ComposeStep {
    fn name(&self) -> &str {
        "Compose"
    }

    fn description(&self) -> &str {
        "Compose subtitle video"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if let Some(ref background) = ctx.plan.background {
            if ctx.plan.mode.produces_video() && !background.is_file() {
                return Err(StepError::file_not_found(background.display().to_string()));
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        if !ctx.plan.mode.produces_video() {
            return Ok(StepOutcome::Skipped("stems only".to_string()));
        }

        let video = ctx.artifact(Stage::Compose, ArtifactKind::Video);
        if ArtifactPathResolver::is_cached(&video) {
            ctx.logger.cached(&format!("Video {}", video.display()));
            state.composition = Some(CompositionOutput {
                video,
                reused: true,
            });
            return Ok(StepOutcome::Success);
        }

        let separation = state
            .separation
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("stems not separated"))?;
        let alignment = state
            .alignment
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("subtitles not aligned"))?;

        let audio = match ctx.plan.mode {
            ProductionMode::KaraokeVideo => separation.instrumental.clone(),
            _ => ctx.plan.audio.clone(),
        };

        let request = ComposeRequest {
            audio,
            subtitle: alignment.subtitle.clone(),
            background: Self::background(ctx),
            overlay_text: Self::overlay_text(ctx),
            resolution: ctx.settings.composition.target_resolution(),
            silent_background: ctx.artifact(Stage::Compose, ArtifactKind::SilentBackground),
        };
        match request.background.path() {
            Some(path) => ctx.logger.info(&format!("Background: {}", path.display())),
            None => ctx.logger.info("Background: solid black"),
        }

        let outcome = ctx.engines.composer.compose(&request, &video, &ctx.env())?;
        ctx.logger
            .info(&format!("Rendered {:.1}s of video", outcome.duration_secs));

        state.composition = Some(CompositionOutput {
            video,
            reused: false,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        let composition = state
            .composition
            .as_ref()
            .ok_or_else(|| StepError::invalid_output("composition not recorded"))?;
        if !ArtifactPathResolver::is_cached(&composition.video) {
            return Err(StepError::invalid_output(format!(
                "video missing: {}",
                composition.video.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::steps::{AlignStep, SeparateStep};
    use crate::orchestrator::testing::TestRig;

    fn aligned(rig: &TestRig) -> RunState {
        let mut state = RunState::new("t");
        SeparateStep.execute(&rig.ctx, &mut state).unwrap();
        AlignStep.execute(&rig.ctx, &mut state).unwrap();
        state
    }

    #[test]
    fn music_video_uses_full_mix() {
        let rig = TestRig::new(ProductionMode::MusicVideo);
        let mut state = aligned(&rig);

        ComposeStep.execute(&rig.ctx, &mut state).unwrap();
        ComposeStep.validate_output(&rig.ctx, &state).unwrap();

        let requests = rig.composer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].audio, rig.ctx.plan.audio);
        assert_eq!(requests[0].overlay_text.as_deref(), Some("by Lyri.ai"));
        assert_eq!(requests[0].background, Background::Solid);
    }

    #[test]
    fn karaoke_uses_instrumental() {
        let rig = TestRig::new(ProductionMode::KaraokeVideo);
        let mut state = aligned(&rig);

        ComposeStep.execute(&rig.ctx, &mut state).unwrap();
        let instrumental = state.separation.unwrap().instrumental;
        assert_eq!(rig.composer.requests()[0].audio, instrumental);
    }

    #[test]
    fn cached_video_is_reused() {
        let rig = TestRig::new(ProductionMode::MusicVideo);
        let mut state = aligned(&rig);
        ComposeStep.execute(&rig.ctx, &mut state).unwrap();

        let mut again = aligned(&rig);
        ComposeStep.execute(&rig.ctx, &mut again).unwrap();
        assert!(again.composition.unwrap().reused);
        assert_eq!(rig.composer.requests().len(), 1);
    }

    #[test]
    fn empty_overlay_override_disables_overlay() {
        let mut rig = TestRig::new(ProductionMode::MusicVideo);
        rig.ctx.plan.overlay_text = Some(String::new());
        assert_eq!(ComposeStep::overlay_text(&rig.ctx), None);

        rig.ctx.plan.overlay_text = Some("live".to_string());
        assert_eq!(ComposeStep::overlay_text(&rig.ctx).as_deref(), Some("live"));
    }

    #[test]
    fn stems_only_never_calls_composer() {
        let rig = TestRig::new(ProductionMode::StemsOnly);
        let mut state = RunState::new("t");
        SeparateStep.execute(&rig.ctx, &mut state).unwrap();

        let outcome = ComposeStep.execute(&rig.ctx, &mut state).unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped(_)));
        assert!(rig.composer.requests().is_empty());
    }
}

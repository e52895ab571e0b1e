//! Pipeline step trait definition.

use super::errors::StepResult;
use super::types::{Context, RunState, StepOutcome};

/// Trait for pipeline steps.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before execution
/// 2. `execute` - Perform the step's work
/// 3. `validate_output` - Verify the step produced valid output
///
/// A step that does not apply to the task's production mode returns
/// `StepOutcome::Skipped` from `execute`, so `validate_input` must accept
/// such tasks as well.
pub trait PipelineStep: Send + Sync {
    /// Step name (for logging and error context).
    fn name(&self) -> &str;

    /// Check that inputs are present before execution.
    fn validate_input(&self, ctx: &Context) -> StepResult<()>;

    /// Perform the step and record its results in `state`.
    ///
    /// A step whose output is already cached reuses it and still returns
    /// `Success`.
    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome>;

    /// Verify outputs after a successful `execute`.
    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()>;

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedStep;

    impl PipelineStep for NamedStep {
        fn name(&self) -> &str {
            "Named"
        }

        fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &Context, _state: &mut RunState) -> StepResult<StepOutcome> {
            Ok(StepOutcome::Success)
        }

        fn validate_output(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
            Ok(())
        }
    }

    #[test]
    fn description_defaults_to_name() {
        let step: Box<dyn PipelineStep> = Box::new(NamedStep);
        assert_eq!(step.name(), "Named");
        assert_eq!(step.description(), "Named");
    }
}

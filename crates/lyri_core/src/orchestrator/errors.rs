//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Task → Step → Stage → Detail

use std::io;

use thiserror::Error;

use crate::models::FailureKind;
use crate::stages::StageError;

/// Top-level pipeline error with task context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A step failed during execution.
    #[error("Task '{task_id}' failed at step '{step_name}': {source}")]
    StepFailed {
        task_id: String,
        step_name: String,
        #[source]
        source: StepError,
    },

    /// A step's inputs or outputs did not check out.
    #[error("Task '{task_id}' failed validation: {message}")]
    ValidationFailed { task_id: String, message: String },

    /// Pipeline was cancelled.
    #[error("Task '{task_id}' was cancelled")]
    Cancelled { task_id: String },

    /// Inputs could not be fingerprinted or directories created.
    #[error("Task '{task_id}' setup failed: {message}")]
    SetupFailed { task_id: String, message: String },
}

impl PipelineError {
    pub fn step_failed(
        task_id: impl Into<String>,
        step_name: impl Into<String>,
        source: StepError,
    ) -> Self {
        Self::StepFailed {
            task_id: task_id.into(),
            step_name: step_name.into(),
            source,
        }
    }

    pub fn validation_failed(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn setup_failed(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(task_id: impl Into<String>) -> Self {
        Self::Cancelled {
            task_id: task_id.into(),
        }
    }

    /// True when the run stopped because of a cancel request, whether it
    /// was noticed between steps or inside a stage.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Cancelled { .. } => true,
            PipelineError::StepFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Failure class recorded on the task.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::StepFailed { source, .. } => source.failure_kind(),
            PipelineError::ValidationFailed { .. } | PipelineError::SetupFailed { .. } => {
                FailureKind::Setup
            }
            PipelineError::Cancelled { .. } => FailureKind::Internal,
        }
    }
}

/// Error from a pipeline step.
#[derive(Error, Debug)]
pub enum StepError {
    /// A stage reported one of its own failures.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// File I/O error outside any stage engine.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A required file was not found.
    #[error("Required file not found: {path}")]
    FileNotFound { path: String },

    /// A previous step did not leave what this step needs.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),
}

impl StepError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Stage(e) if e.is_cancelled())
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StepError::Stage(e) => match e {
                StageError::Separation(_) => FailureKind::Separation,
                StageError::UnsupportedLanguage { .. } => FailureKind::UnsupportedLanguage,
                StageError::Alignment(_) => FailureKind::Alignment,
                StageError::Composition(_) => FailureKind::Composition,
                StageError::Transcode(_) => FailureKind::Transcode,
                StageError::Cancelled => FailureKind::Internal,
            },
            StepError::InvalidInput(_) | StepError::FileNotFound { .. } => FailureKind::Setup,
            StepError::InvalidOutput(_)
            | StepError::IoError { .. }
            | StepError::PreconditionFailed(_) => FailureKind::Internal,
        }
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

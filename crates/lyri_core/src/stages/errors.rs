//! Stage error taxonomy and the per-call environment.

use std::time::Duration;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::logging::TaskLogger;
use crate::tools::{ToolError, ToolRunner};

/// Failure of one pipeline stage.
///
/// Each stage reports exactly one of these; subprocess and I/O failures
/// are folded into the stage's own variant.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Separation failed: {0}")]
    Separation(String),

    #[error("Unsupported lyrics language '{language}' (supported: {})", allowed.join(", "))]
    UnsupportedLanguage {
        language: String,
        allowed: Vec<String>,
    },

    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Cancelled")]
    Cancelled,
}

impl StageError {
    pub fn separation(message: impl Into<String>) -> Self {
        Self::Separation(message.into())
    }

    pub fn alignment(message: impl Into<String>) -> Self {
        Self::Alignment(message.into())
    }

    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    pub fn transcode(message: impl Into<String>) -> Self {
        Self::Transcode(message.into())
    }

    pub fn unsupported_language(language: impl Into<String>, allowed: &[String]) -> Self {
        Self::UnsupportedLanguage {
            language: language.into(),
            allowed: allowed.to_vec(),
        }
    }

    /// Fold a tool failure into a stage error; cancellation stays cancellation.
    pub fn from_tool(err: ToolError, wrap: fn(String) -> StageError) -> Self {
        if err.is_cancelled() {
            StageError::Cancelled
        } else {
            wrap(err.to_string())
        }
    }

    /// Fold an I/O failure into a stage error with context.
    pub fn from_io(
        operation: &str,
        err: std::io::Error,
        wrap: fn(String) -> StageError,
    ) -> Self {
        wrap(format!("{}: {}", operation, err))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Cancelled)
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// What every stage call gets from its task: a logger, the task's cancel
/// token and the per-stage timeout.
#[derive(Clone, Copy)]
pub struct StageEnv<'a> {
    pub logger: &'a TaskLogger,
    pub cancel: &'a CancelToken,
    pub timeout: Option<Duration>,
}

impl<'a> StageEnv<'a> {
    pub fn new(logger: &'a TaskLogger, cancel: &'a CancelToken, timeout: Option<Duration>) -> Self {
        Self {
            logger,
            cancel,
            timeout,
        }
    }

    /// Subprocess runner bound to this environment.
    pub fn runner(&self) -> ToolRunner<'a> {
        ToolRunner::new(self.logger, self.cancel, self.timeout)
    }

    /// Fail fast if the task has been cancelled.
    pub fn check_cancelled(&self) -> StageResult<()> {
        if self.cancel.is_cancelled() {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

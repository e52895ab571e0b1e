//! Task records, states and errors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ArtifactKind, FailureKind, InputKey, ProductionMode, TaskPlan};

/// Opaque task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Fresh random (UUID v4) id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, required inputs not all registered yet.
    #[default]
    Pending,
    /// All required inputs registered, ready to run.
    Uploaded,
    /// Running or waiting for a worker.
    Processing,
    /// Cancel requested, pipeline still stopping.
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Uploaded => "uploaded",
            TaskState::Processing => "processing",
            TaskState::Cancelling => "cancelling",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// A pipeline may be writing files for the task.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskState::Processing | TaskState::Cancelling)
    }

    /// Inputs may still be added.
    pub fn accepts_inputs(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Uploaded)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub state: TaskState,
    pub input_files: BTreeMap<InputKey, PathBuf>,
    pub production_mode: ProductionMode,
    /// Overlay override from metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_text: Option<String>,
    /// Lyrics language from metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
    /// Non-empty only when completed.
    pub results: BTreeMap<ArtifactKind, PathBuf>,
    /// Set only when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Step currently running, while processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl TaskRecord {
    pub fn new(id: TaskId, production_mode: ProductionMode) -> Self {
        let now = Local::now();
        Self {
            id,
            state: TaskState::Pending,
            input_files: BTreeMap::new(),
            production_mode,
            overlay_text: None,
            language_hint: None,
            results: BTreeMap::new(),
            error_message: None,
            failure_kind: None,
            current_step: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Required inputs not yet registered.
    ///
    /// Audio is always required; lyrics only for video modes when the
    /// aligner reads them.
    pub fn missing_inputs(&self, aligner_needs_lyrics: bool) -> Vec<InputKey> {
        let mut required = vec![InputKey::Audio];
        if self.production_mode.produces_video() && aligner_needs_lyrics {
            required.push(InputKey::Lyrics);
        }
        required
            .into_iter()
            .filter(|key| !self.input_files.contains_key(key))
            .collect()
    }

    /// Plan for the orchestrator, if audio is registered.
    pub fn plan(&self) -> Option<TaskPlan> {
        let audio = self.input_files.get(&InputKey::Audio)?;
        Some(TaskPlan {
            task_id: self.id.to_string(),
            audio: audio.clone(),
            lyrics: self.input_files.get(&InputKey::Lyrics).cloned(),
            background: self.input_files.get(&InputKey::Background).cloned(),
            mode: self.production_mode,
            overlay_text: self.overlay_text.clone(),
            language_hint: self.language_hint.clone(),
        })
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Local::now();
    }
}

/// Read-only view of a task for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
    pub production_mode: ProductionMode,
    pub results: BTreeMap<ArtifactKind, PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub updated_at: DateTime<Local>,
}

impl From<&TaskRecord> for TaskSnapshot {
    fn from(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            state: record.state,
            production_mode: record.production_mode,
            results: record.results.clone(),
            error_message: record.error_message.clone(),
            failure_kind: record.failure_kind,
            current_step: record.current_step.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// Errors from task store operations.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task '{0}' not found")]
    NotFound(TaskId),

    #[error("Task '{0}' already exists")]
    AlreadyExists(TaskId),

    #[error("Cannot {action} task '{id}' while it is {state}")]
    InvalidState {
        id: TaskId,
        state: TaskState,
        action: &'static str,
    },

    #[error("Invalid metadata for task '{id}': {message}")]
    InvalidMetadata { id: TaskId, message: String },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    pub fn invalid_state(id: &TaskId, state: TaskState, action: &'static str) -> Self {
        Self::InvalidState {
            id: id.clone(),
            state,
            action,
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

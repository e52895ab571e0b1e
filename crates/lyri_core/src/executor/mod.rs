//! Asynchronous task execution.
//!
//! `TaskExecutor::run` flips a task to `Processing` before returning, then
//! runs the pipeline on a blocking worker. At most
//! `executor.max_concurrent_tasks` pipelines run at once; the rest wait
//! for a permit and can be cancelled while waiting.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::logging::{LogConfig, TaskLogger};
use crate::models::{FailureKind, TaskPlan};
use crate::orchestrator::{Orchestrator, ProgressCallback};
use crate::tasks::{TaskError, TaskId, TaskResult, TaskSnapshot, TaskState, TaskStore};

/// How often a queued task re-checks its cancel token.
const PERMIT_POLL: Duration = Duration::from_millis(50);

/// Runs tasks from a store through an orchestrator.
pub struct TaskExecutor {
    store: Arc<TaskStore>,
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    cancels: Arc<Mutex<HashMap<TaskId, CancelToken>>>,
    log_dir: Option<PathBuf>,
    log_config: LogConfig,
}

impl TaskExecutor {
    /// Executor sized and logging as the orchestrator's settings say.
    pub fn new(store: Arc<TaskStore>, orchestrator: Arc<Orchestrator>) -> Self {
        let settings = orchestrator.settings();
        let max_tasks = settings.executor.max_concurrent_tasks.max(1);
        let log_dir = Some(PathBuf::from(&settings.paths.logs_folder));
        let log_config = LogConfig::from(&settings.logging);

        Self {
            store,
            orchestrator,
            permits: Arc::new(Semaphore::new(max_tasks)),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            log_dir,
            log_config,
        }
    }

    /// Keep task logs in tracing only.
    pub fn without_log_files(mut self) -> Self {
        self.log_dir = None;
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Start a task.
    ///
    /// The state change to `Processing` happens before this returns; a
    /// task that is not `Uploaded` is rejected. The returned handle
    /// resolves once the task is terminal.
    pub fn run(&self, id: &TaskId) -> TaskResult<JoinHandle<()>> {
        // Registered first so a cancel arriving right after the state
        // change always finds the token
        let cancel = CancelToken::new();
        {
            let mut cancels = self.cancels.lock();
            if cancels.contains_key(id) {
                let state = self.store.snapshot(id)?.state;
                return Err(TaskError::invalid_state(id, state, "start"));
            }
            cancels.insert(id.clone(), cancel.clone());
        }

        let plan = match self.store.begin_processing(id) {
            Ok(plan) => plan,
            Err(e) => {
                self.cancels.lock().remove(id);
                return Err(e);
            }
        };

        let job = TaskJob {
            id: id.clone(),
            plan,
            cancel,
            store: Arc::clone(&self.store),
            orchestrator: Arc::clone(&self.orchestrator),
            permits: Arc::clone(&self.permits),
            cancels: Arc::clone(&self.cancels),
            log_dir: self.log_dir.clone(),
            log_config: self.log_config.clone(),
        };
        Ok(tokio::spawn(job.run()))
    }

    /// Request cancellation of a processing task.
    pub fn cancel(&self, id: &TaskId) -> TaskResult<TaskState> {
        let state = self.store.cancel(id)?;
        if let Some(token) = self.cancels.lock().get(id) {
            token.cancel();
        }
        Ok(state)
    }

    /// Poll until the task is terminal.
    pub async fn wait_for_terminal(&self, id: &TaskId, poll_interval: Duration) -> TaskResult<TaskSnapshot> {
        loop {
            let snapshot = self.store.snapshot(id)?;
            if snapshot.state.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Number of tasks started and not yet finished.
    pub fn active_count(&self) -> usize {
        self.cancels.lock().len()
    }
}

/// One task on its way through a worker.
struct TaskJob {
    id: TaskId,
    plan: TaskPlan,
    cancel: CancelToken,
    store: Arc<TaskStore>,
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    cancels: Arc<Mutex<HashMap<TaskId, CancelToken>>>,
    log_dir: Option<PathBuf>,
    log_config: LogConfig,
}

impl TaskJob {
    async fn run(self) {
        let id = self.id.clone();
        let cancels = Arc::clone(&self.cancels);

        match acquire(&self.permits, &self.cancel).await {
            Some(permit) => self.execute(permit).await,
            None => {
                tracing::info!(task = %id, "Cancelled while waiting for a worker");
                report(self.store.mark_cancelled(&id), &id);
            }
        }

        cancels.lock().remove(&id);
    }

    async fn execute(self, permit: OwnedSemaphorePermit) {
        let TaskJob {
            id,
            plan,
            cancel,
            store,
            orchestrator,
            log_dir,
            log_config,
            ..
        } = self;

        let logger = Arc::new(open_logger(&id, log_dir.as_ref(), log_config));
        let progress_store = Arc::clone(&store);
        let progress_id = id.clone();
        let progress: ProgressCallback = Box::new(move |step, _percent, _message| {
            progress_store.set_current_step(&progress_id, step);
        });

        let worker_logger = Arc::clone(&logger);
        let outcome = tokio::task::spawn_blocking(move || {
            orchestrator.run_with_progress(&plan, worker_logger, cancel, Some(progress))
        })
        .await;
        drop(permit);

        let recorded = match outcome {
            Ok(Ok(output)) => store.complete(&id, output.results),
            Ok(Err(e)) if e.is_cancelled() => {
                logger.warn("Task cancelled");
                store.mark_cancelled(&id)
            }
            Ok(Err(e)) => {
                logger.error(&e.to_string());
                store.fail(&id, e.failure_kind(), e.to_string())
            }
            Err(join_error) => {
                logger.error(&format!("Worker crashed: {}", join_error));
                store.fail(
                    &id,
                    FailureKind::Internal,
                    format!("worker crashed: {}", join_error),
                )
            }
        };
        report(recorded, &id);
        logger.close();
    }
}

/// Wait for a worker permit. `None` when cancelled first.
async fn acquire(permits: &Arc<Semaphore>, cancel: &CancelToken) -> Option<OwnedSemaphorePermit> {
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        match tokio::time::timeout(PERMIT_POLL, Arc::clone(permits).acquire_owned()).await {
            Ok(Ok(permit)) => {
                if cancel.is_cancelled() {
                    return None;
                }
                return Some(permit);
            }
            Ok(Err(_closed)) => return None,
            Err(_elapsed) => continue,
        }
    }
}

fn open_logger(id: &TaskId, log_dir: Option<&PathBuf>, config: LogConfig) -> TaskLogger {
    match log_dir {
        Some(dir) => match TaskLogger::new(id.as_str(), dir, config.clone()) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!(task = %id, "Could not open log file in {}: {}", dir.display(), e);
                TaskLogger::detached(id.as_str(), config)
            }
        },
        None => TaskLogger::detached(id.as_str(), config),
    }
}

fn report(result: TaskResult<TaskState>, id: &TaskId) {
    match result {
        Ok(state) => tracing::info!(task = %id, "Task finished: {}", state),
        Err(e) => tracing::warn!(task = %id, "Could not record task outcome: {}", e),
    }
}

//! Vocal/instrumental separation.
//!
//! Engines hold a loaded model and are not assumed to be thread-safe, so
//! they are only reached through `SeparatorPool`, which lends each
//! instance to one task at a time.

use std::fmt;
use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::artifacts::{commit, partial_path};
use crate::config::SeparationSettings;
use crate::logging::TaskLogger;
use crate::models::StemRole;
use crate::tools::ToolCommand;

use super::errors::{StageEnv, StageError, StageResult};

/// Audio extensions recognised in an engine's output directory.
const STEM_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "ogg", "m4a", "aiff"];

/// One file produced by a separation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStem {
    pub path: PathBuf,
    pub role: Option<StemRole>,
}

impl EngineStem {
    pub fn new(path: impl Into<PathBuf>, role: Option<StemRole>) -> Self {
        Self {
            path: path.into(),
            role,
        }
    }
}

/// A loaded separation model.
pub trait SeparationEngine: Send {
    /// Separate `mixed` into stems written under `scratch_dir`.
    ///
    /// Stems are returned in engine output order.
    fn separate(
        &mut self,
        mixed: &Path,
        scratch_dir: &Path,
        env: &StageEnv,
    ) -> StageResult<Vec<EngineStem>>;
}

/// Pick the vocal and instrumental stems from an engine's output.
///
/// Tagged roles win. Without a tag the last stem is taken as vocal and
/// the first as instrumental.
pub fn select_stems(stems: &[EngineStem], logger: &TaskLogger) -> StageResult<(PathBuf, PathBuf)> {
    let (first, last) = match (stems.first(), stems.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(StageError::separation("engine produced no stems")),
    };

    let tagged = |role: StemRole| stems.iter().find(|s| s.role == Some(role));

    let vocal = match tagged(StemRole::Vocal) {
        Some(s) => s,
        None => {
            logger.warn(&format!(
                "No stem tagged as vocal, using last output {}",
                last.path.display()
            ));
            last
        }
    };
    let instrumental = match tagged(StemRole::Instrumental) {
        Some(s) => s,
        None => {
            logger.warn(&format!(
                "No stem tagged as instrumental, using first output {}",
                first.path.display()
            ));
            first
        }
    };

    if vocal.path == instrumental.path {
        return Err(StageError::separation(format!(
            "engine produced a single stem ({})",
            vocal.path.display()
        )));
    }

    Ok((vocal.path.clone(), instrumental.path.clone()))
}

/// Move both stems into place, or neither.
pub fn install_stems(
    vocal_src: &Path,
    instrumental_src: &Path,
    vocal_dst: &Path,
    instrumental_dst: &Path,
) -> io::Result<()> {
    let vocal_partial = partial_path(vocal_dst);
    let instrumental_partial = partial_path(instrumental_dst);

    let staged = stage_file(vocal_src, &vocal_partial)
        .and_then(|_| stage_file(instrumental_src, &instrumental_partial));
    if let Err(e) = staged {
        let _ = fs::remove_file(&vocal_partial);
        let _ = fs::remove_file(&instrumental_partial);
        return Err(e);
    }

    if let Err(e) = commit(&instrumental_partial, instrumental_dst) {
        let _ = fs::remove_file(&vocal_partial);
        return Err(e);
    }
    if let Err(e) = commit(&vocal_partial, vocal_dst) {
        let _ = fs::remove_file(instrumental_dst);
        return Err(e);
    }
    Ok(())
}

fn stage_file(src: &Path, partial: &Path) -> io::Result<()> {
    crate::artifacts::ensure_parent(partial)?;
    // Scratch dirs live beside the stage dir, so rename normally succeeds
    if fs::rename(src, partial).is_err() {
        fs::copy(src, partial)?;
    }
    Ok(())
}

/// Separation engine backed by an external command.
///
/// Runs `{command} INPUT --model_filename F --model_file_dir D
/// --output_dir OUT --output_format FMT` and tags the files it writes by
/// the configured stem labels.
#[derive(Debug, Clone)]
pub struct CommandSeparator {
    command: Vec<String>,
    model_path: PathBuf,
    vocal_label: String,
    instrumental_label: String,
    output_format: String,
}

impl CommandSeparator {
    pub fn from_settings(settings: &SeparationSettings) -> Self {
        Self {
            command: settings.command.clone(),
            model_path: PathBuf::from(&settings.model_path),
            vocal_label: settings.vocal_label.clone(),
            instrumental_label: settings.instrumental_label.clone(),
            output_format: settings.output_format.clone(),
        }
    }

    pub fn command(&self, mixed: &Path, scratch_dir: &Path) -> Option<ToolCommand> {
        let model_file = self
            .model_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let model_dir = self
            .model_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let command = ToolCommand::from_argv(&self.command)?
            .arg(mixed)
            .arg("--model_filename")
            .arg(model_file)
            .arg("--model_file_dir")
            .arg(model_dir)
            .arg("--output_dir")
            .arg(scratch_dir)
            .arg("--output_format")
            .arg(&self.output_format);
        Some(command)
    }

    /// Role implied by a stem file name, if exactly one label matches.
    pub fn role_from_name(&self, file_name: &str) -> Option<StemRole> {
        let name = file_name.to_lowercase();
        let vocal = self.vocal_label.to_lowercase();
        let instrumental = self.instrumental_label.to_lowercase();

        // audio-separator brackets the stem label: song_(Vocals)_model.wav
        let bracketed = (
            name.contains(&format!("({})", vocal)),
            name.contains(&format!("({})", instrumental)),
        );
        let matched = match bracketed {
            (false, false) => (name.contains(&vocal), name.contains(&instrumental)),
            other => other,
        };

        match matched {
            (true, false) => Some(StemRole::Vocal),
            (false, true) => Some(StemRole::Instrumental),
            _ => None,
        }
    }

    fn collect_stems(&self, scratch_dir: &Path) -> io::Result<Vec<EngineStem>> {
        let mut files: Vec<PathBuf> = fs::read_dir(scratch_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .map(|e| {
                        let e = e.to_string_lossy().to_ascii_lowercase();
                        STEM_EXTENSIONS.contains(&e.as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        Ok(files
            .into_iter()
            .map(|path| {
                let role = path
                    .file_name()
                    .and_then(|n| self.role_from_name(&n.to_string_lossy()));
                EngineStem { path, role }
            })
            .collect())
    }
}

impl SeparationEngine for CommandSeparator {
    fn separate(
        &mut self,
        mixed: &Path,
        scratch_dir: &Path,
        env: &StageEnv,
    ) -> StageResult<Vec<EngineStem>> {
        fs::create_dir_all(scratch_dir).map_err(|e| {
            StageError::from_io("creating separation directory", e, StageError::Separation)
        })?;

        let command = self
            .command(mixed, scratch_dir)
            .ok_or_else(|| StageError::separation("no separator command configured"))?;

        env.runner()
            .run(&command)
            .map_err(|e| StageError::from_tool(e, StageError::Separation))?;

        self.collect_stems(scratch_dir)
            .map_err(|e| StageError::from_io("listing separated stems", e, StageError::Separation))
    }
}

/// Fixed set of engine instances shared by all tasks.
pub struct SeparatorPool {
    idle: Mutex<Vec<Box<dyn SeparationEngine>>>,
    available: Condvar,
    size: usize,
}

impl SeparatorPool {
    pub fn new(engines: Vec<Box<dyn SeparationEngine>>) -> Self {
        let size = engines.len();
        Self {
            idle: Mutex::new(engines),
            available: Condvar::new(),
            size,
        }
    }

    /// Build `instances` engines from a factory.
    pub fn with_instances<F>(instances: usize, mut factory: F) -> Self
    where
        F: FnMut() -> Box<dyn SeparationEngine>,
    {
        Self::new((0..instances.max(1)).map(|_| factory()).collect())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Borrow an idle engine, blocking until one is free.
    ///
    /// Gives up with `Cancelled` when the task is cancelled and with a
    /// separation error when the stage timeout runs out first.
    pub fn checkout(&self, env: &StageEnv) -> StageResult<PooledEngine<'_>> {
        if self.size == 0 {
            return Err(StageError::separation("no separation engines configured"));
        }

        let started = Instant::now();
        let mut idle = self.idle.lock();
        loop {
            if env.cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            if let Some(engine) = idle.pop() {
                return Ok(PooledEngine { pool: self, engine });
            }

            let mut wait = Duration::from_millis(50);
            if let Some(limit) = env.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(StageError::separation(format!(
                        "timed out after {}s waiting for a separation engine",
                        limit.as_secs()
                    )));
                }
                wait = wait.min(limit - elapsed);
            }
            self.available.wait_for(&mut idle, wait);
        }
    }

    fn give_back(&self, engine: Box<dyn SeparationEngine>) {
        self.idle.lock().push(engine);
        self.available.notify_one();
    }
}

impl fmt::Debug for SeparatorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeparatorPool")
            .field("size", &self.size)
            .finish()
    }
}

/// Engine on loan from a `SeparatorPool`; returned on drop.
pub struct PooledEngine<'a> {
    pool: &'a SeparatorPool,
    engine: Box<dyn SeparationEngine>,
}

impl Deref for PooledEngine<'_> {
    type Target = dyn SeparationEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl DerefMut for PooledEngine<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_mut()
    }
}

impl fmt::Debug for PooledEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEngine")
            .field("pool_size", &self.pool.size)
            .finish()
    }
}

impl Drop for PooledEngine<'_> {
    fn drop(&mut self) {
        let engine = std::mem::replace(&mut self.engine, Box::new(Returned));
        self.pool.give_back(engine);
    }
}

/// Stand-in left in a guard after its engine went back to the pool.
struct Returned;

impl SeparationEngine for Returned {
    fn separate(&mut self, _: &Path, _: &Path, _: &StageEnv) -> StageResult<Vec<EngineStem>> {
        Err(StageError::separation("engine already returned to the pool"))
    }
}

//! Per-task logger with file, sink and tracing output.
//!
//! Each task run gets its own logger that:
//! - Writes to a dedicated log file
//! - Forwards lines to an optional sink
//! - Mirrors lines into `tracing` with the task id attached
//! - Keeps a tail of external tool output for failure reports

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, LogSink, MessagePrefix};

/// Logger for a single task run.
pub struct TaskLogger {
    task_id: String,
    log_path: Option<PathBuf>,
    file_writer: Mutex<Option<BufWriter<File>>>,
    sink: Mutex<Option<LogSink>>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl TaskLogger {
    /// Create a logger writing to `{log_dir}/{task_id}.log`.
    ///
    /// An existing log file is appended to, so reruns of the same task
    /// keep their history.
    pub fn new(
        task_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let task_id = task_id.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&task_id)));
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            task_id,
            log_path: Some(log_path),
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            sink: Mutex::new(None),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(64)),
        })
    }

    /// Create a logger without a backing file.
    pub fn detached(task_id: impl Into<String>, config: LogConfig) -> Self {
        Self {
            task_id: task_id.into(),
            log_path: None,
            file_writer: Mutex::new(None),
            sink: Mutex::new(None),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(64)),
        }
    }

    /// Attach a sink that receives every formatted line.
    pub fn with_sink(self, sink: LogSink) -> Self {
        *self.sink.lock() = Some(sink);
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        if self.config.mirror_to_tracing {
            let task = self.task_id.as_str();
            match level {
                LogLevel::Trace => tracing::trace!(task, "{}", message),
                LogLevel::Debug => tracing::debug!(task, "{}", message),
                LogLevel::Info => tracing::info!(task, "{}", message),
                LogLevel::Warn => tracing::warn!(task, "{}", message),
                LogLevel::Error => tracing::error!(task, "{}", message),
            }
        }

        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log an external command line before it runs.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Log a stage marker.
    pub fn stage(&self, stage_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Stage.format(stage_name));
    }

    /// Log a stage that was satisfied from cached artifacts.
    pub fn cached(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Cached.format(message));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Record one line of external tool output.
    ///
    /// Lines always land in the tail buffer; outside compact mode they
    /// are also written to the log.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        {
            let mut buffer = self.tail_buffer.lock();
            while buffer.len() >= self.config.error_tail.max(1) {
                buffer.pop_front();
            }
            buffer.push_back(line.to_string());
        }

        if self.config.compact {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        self.log(LogLevel::Debug, &format!("{}{}", prefix, line));
    }

    /// Write the tail buffer to the log, typically after a tool failure.
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in &lines {
            self.output(&self.format_message(line));
        }
    }

    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the log file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref sink) = *self.sink.lock() {
            sink(formatted);
        }
    }
}

impl Drop for TaskLogger {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TaskLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLogger")
            .field("task_id", &self.task_id)
            .field("log_path", &self.log_path)
            .finish()
    }
}

/// Make a string safe to use as a file name.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}

//! External tool invocation with timeout and cancellation.
//!
//! Every subprocess the pipeline starts goes through `ToolRunner::run`.
//! The child is polled rather than waited on, so a cancel request or an
//! expired stage deadline kills it within one poll interval.

use std::ffi::{OsStr, OsString};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::logging::TaskLogger;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of stderr lines carried in a failure message.
const FAILURE_LINES: usize = 5;

/// Errors from running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed with exit code {code}: {message}")]
    Failed {
        program: String,
        code: i32,
        message: String,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Unexpected output from {program}: {message}")]
    BadOutput { program: String, message: String },
}

impl ToolError {
    pub fn bad_output(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadOutput {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Cancelled { .. })
    }
}

/// A command line to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Build from a configured argv (program followed by fixed arguments).
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(program.clone()).args(rest))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Short program name for messages (`/usr/bin/ffmpeg` -> `ffmpeg`).
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.clone())
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(quote(OsStr::new(&self.program)))
            .chain(self.args.iter().map(|a| quote(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn quote(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs commands on behalf of one task stage.
pub struct ToolRunner<'a> {
    logger: &'a TaskLogger,
    cancel: &'a CancelToken,
    timeout: Option<Duration>,
}

impl<'a> ToolRunner<'a> {
    pub fn new(logger: &'a TaskLogger, cancel: &'a CancelToken, timeout: Option<Duration>) -> Self {
        Self {
            logger,
            cancel,
            timeout,
        }
    }

    pub fn logger(&self) -> &TaskLogger {
        self.logger
    }

    /// Run a command to completion.
    ///
    /// Output lines go to the logger's tail buffer. A non-zero exit shows
    /// the tail and returns `ToolError::Failed`.
    pub fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        let program = command.tool_name();
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled { program });
        }

        self.logger.command(&command.display());

        let mut child = command
            .to_command()
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = self.wait(&mut child, &program)?;

        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);
        for line in &stdout {
            self.logger.output_line(line, false);
        }
        for line in &stderr {
            self.logger.output_line(line, true);
        }

        if !status.success() {
            self.logger.show_tail(&program);
            let message = failure_message(&stderr, &stdout);
            return Err(ToolError::Failed {
                program,
                code: status.code().unwrap_or(-1),
                message,
            });
        }

        Ok(ToolOutput {
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
        })
    }

    fn wait(&self, child: &mut Child, program: &str) -> Result<ExitStatus, ToolError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(source) => {
                    kill(child);
                    return Err(ToolError::Io {
                        program: program.to_string(),
                        source,
                    });
                }
            }

            if self.cancel.is_cancelled() {
                kill(child);
                self.logger.warn(&format!("{} killed: task cancelled", program));
                return Err(ToolError::Cancelled {
                    program: program.to_string(),
                });
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    kill(child);
                    self.logger.warn(&format!(
                        "{} killed after {}s timeout",
                        program,
                        limit.as_secs()
                    ));
                    return Err(ToolError::TimedOut {
                        program: program.to_string(),
                        after: limit,
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<String>>> {
    stream.map(|s| {
        thread::spawn(move || {
            BufReader::new(s)
                .lines()
                .map_while(Result::ok)
                .collect::<Vec<_>>()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn failure_message(stderr: &[String], stdout: &[String]) -> String {
    let source = if stderr.iter().any(|l| !l.trim().is_empty()) {
        stderr
    } else {
        stdout
    };
    let lines: Vec<&str> = source
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(FAILURE_LINES);
    if lines.is_empty() {
        "no output".to_string()
    } else {
        lines[start..].join(" | ")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logging::LogConfig;

    fn logger() -> TaskLogger {
        TaskLogger::detached(
            "runner-test",
            LogConfig {
                mirror_to_tracing: false,
                ..LogConfig::default()
            },
        )
    }

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn captures_stdout() {
        let logger = logger();
        let cancel = CancelToken::new();
        let runner = ToolRunner::new(&logger, &cancel, None);

        let output = runner.run(&sh("echo hello; echo world")).unwrap();
        assert_eq!(output.stdout, "hello\nworld");
    }

    #[test]
    fn non_zero_exit_fails_with_stderr() {
        let logger = logger();
        let cancel = CancelToken::new();
        let runner = ToolRunner::new(&logger, &cancel, None);

        let err = runner.run(&sh("echo bad input >&2; exit 3")).unwrap_err();
        match err {
            ToolError::Failed { code, message, .. } => {
                assert_eq!(code, 3);
                assert!(message.contains("bad input"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(logger.get_tail().iter().any(|l| l == "bad input"));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let logger = logger();
        let cancel = CancelToken::new();
        let runner = ToolRunner::new(&logger, &cancel, None);

        let err = runner
            .run(&ToolCommand::new("/nonexistent/lyri-tool"))
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn timeout_kills_child() {
        let logger = logger();
        let cancel = CancelToken::new();
        let runner = ToolRunner::new(&logger, &cancel, Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = runner.run(&ToolCommand::new("sleep").arg("10")).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_before_start_never_spawns() {
        let logger = logger();
        let cancel = CancelToken::new();
        cancel.cancel();
        let runner = ToolRunner::new(&logger, &cancel, None);

        let err = runner.run(&ToolCommand::new("/nonexistent/lyri-tool")).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancel_while_running_kills_child() {
        let logger = logger();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let runner = ToolRunner::new(&logger, &cancel, None);

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            trigger.cancel();
        });
        let started = Instant::now();
        let err = runner.run(&ToolCommand::new("sleep").arg("10")).unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn display_quotes_spaces() {
        let cmd = ToolCommand::new("ffmpeg").arg("-i").arg("my song.wav");
        assert_eq!(cmd.display(), "ffmpeg -i 'my song.wav'");
    }

    #[test]
    fn from_argv_splits_program() {
        let argv = vec!["python3".to_string(), "-m".to_string(), "aeneas".to_string()];
        let cmd = ToolCommand::from_argv(&argv).unwrap();
        assert_eq!(cmd.program(), "python3");
        assert_eq!(cmd.get_args().len(), 2);
        assert!(ToolCommand::from_argv(&[]).is_none());
    }
}

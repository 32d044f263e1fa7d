//! External process execution

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// A command line plus the directory to run it in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Space-joined command line, for logs and error reports
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// How a failed process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited with a non-zero status code
    Code(i32),
    /// Terminated by a signal
    Signal,
    /// Could not be started at all
    SpawnFailed(String),
    /// Killed after exceeding the runner timeout
    TimedOut(Duration),
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exited with status {}", code),
            ExitKind::Signal => write!(f, "terminated by signal"),
            ExitKind::SpawnFailed(e) => write!(f, "could not be started: {}", e),
            ExitKind::TimedOut(t) => write!(f, "timed out after {:?}", t),
        }
    }
}

/// A non-successful run, with whatever output was captured
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` {exit}")]
pub struct ProcessFailure {
    pub command: String,
    pub exit: ExitKind,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessFailure {
    pub fn new(command: &CommandSpec, exit: ExitKind) -> Self {
        Self {
            command: command.display(),
            exit,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Last non-empty stderr line, falling back to stdout
    pub fn last_line(&self) -> Option<&str> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .find_map(|s| s.lines().rev().map(str::trim).find(|l| !l.is_empty()))
    }
}

/// Runs external commands. Non-zero exit is a returned `ProcessFailure`,
/// never a panic.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessFailure>;
}

/// `tokio::process` backed runner with an optional per-command timeout
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    timeout: Option<Duration>,
}

impl TokioProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessFailure> {
        debug!("Running: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => return Err(ProcessFailure::new(spec, ExitKind::TimedOut(limit))),
            },
            None => cmd.output().await,
        };

        let output = result
            .map_err(|e| ProcessFailure::new(spec, ExitKind::SpawnFailed(e.to_string())))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(ProcessOutput { stdout, stderr });
        }

        let exit = match output.status.code() {
            Some(code) => ExitKind::Code(code),
            None => ExitKind::Signal,
        };
        Err(ProcessFailure::new(spec, exit).with_output(stdout, stderr))
    }
}

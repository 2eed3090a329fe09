//! External process execution
//!
//! Runs one command at a time with stdin inherited and stdout/stderr piped.
//! Two reader tasks drain the pipes line by line into a bounded queue; the
//! invoking task writes queued lines to a single output sink. Lines from the
//! two streams are never torn, but their relative order is whatever the
//! scheduler produces.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::defaults::LINE_QUEUE_DEPTH;
use crate::error::ProcessError;

/// One external command, fully described before it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl Invocation {
    /// Create an invocation of `program` in `cwd`
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments in order
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set environment overrides on top of the inherited environment
    #[must_use]
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The command line as a single string (program and arguments)
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Executes invocations
///
/// The orchestrator is generic over this so that pipelines can be driven
/// without spawning anything (dry runs, tests).
pub trait CommandRunner {
    /// Run the invocation to completion
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<(), ProcessError>> + Send;
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Runs invocations as child processes, streaming their output
#[derive(Clone)]
pub struct ProcessRunner {
    sink: Sink,
}

impl ProcessRunner {
    /// Stream child output to this process's stdout
    pub fn new() -> Self {
        Self::with_sink(Box::new(io::stdout()))
    }

    /// Stream child output (and announcements) to `sink`
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    fn write_bytes(&self, bytes: &[u8]) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = sink.write_all(bytes).and_then(|()| sink.flush()) {
            debug!(error = %e, "output sink write failed");
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner").finish_non_exhaustive()
    }
}

/// Announcement line printed before every invocation
pub fn announcement(invocation: &Invocation) -> String {
    format!(
        "+ {} (in {})\n",
        invocation.command_line(),
        invocation.cwd().display()
    )
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<(), ProcessError>> + Send {
        async move {
            let command = invocation.command_line();
            self.write_bytes(announcement(invocation).as_bytes());

            let mut child = Command::new(invocation.program())
                .args(invocation.arguments())
                .envs(invocation.env())
                .current_dir(invocation.cwd())
                .stdin(Stdio::inherit())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| ProcessError::Spawn {
                    command: command.clone(),
                    error: e.to_string(),
                })?;

            let stdout = child.stdout.take().ok_or_else(|| ProcessError::Pipe {
                command: command.clone(),
                stream: "stdout",
            })?;
            let stderr = child.stderr.take().ok_or_else(|| ProcessError::Pipe {
                command: command.clone(),
                stream: "stderr",
            })?;

            let (tx, mut rx) = mpsc::channel::<Vec<u8>>(LINE_QUEUE_DEPTH);
            let stdout_task = tokio::spawn(drain_lines(stdout, tx.clone(), "stdout"));
            let stderr_task = tokio::spawn(drain_lines(stderr, tx, "stderr"));

            // The channel closes once both readers hit end-of-stream
            while let Some(line) = rx.recv().await {
                self.write_bytes(&line);
            }
            for task in [stdout_task, stderr_task] {
                if let Err(e) = task.await {
                    warn!(error = %e, "output reader task failed");
                }
            }

            let status = child.wait().await.map_err(|e| ProcessError::Wait {
                command: command.clone(),
                error: e.to_string(),
            })?;
            debug!(%command, ?status, "process exited");

            match status.code() {
                Some(0) => Ok(()),
                Some(code) => Err(ProcessError::Exited { command, code }),
                None => Err(ProcessError::Terminated { command }),
            }
        }
    }
}

/// Forward complete lines from `reader` until end-of-stream
async fn drain_lines<R>(reader: R, tx: mpsc::Sender<Vec<u8>>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(stream, error = %e, "failed reading child output");
                break;
            }
        }
    }
}

/// Announces invocations without running them
#[derive(Clone)]
pub struct DryRunRunner {
    inner: ProcessRunner,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self {
            inner: ProcessRunner::new(),
        }
    }

    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            inner: ProcessRunner::with_sink(sink),
        }
    }
}

impl Default for DryRunRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for DryRunRunner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<(), ProcessError>> + Send {
        self.inner.write_bytes(announcement(invocation).as_bytes());
        std::future::ready(Ok(()))
    }
}

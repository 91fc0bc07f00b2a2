//! Process launch, stream draining and supervision.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{KillSwitch, LiveProcess};
use crate::error::{BinError, Result};

/// Input fed to the child's stdin.
pub type StdinSource = Box<dyn AsyncRead + Send + Unpin>;

/// Destination for the child's stdout instead of the capture buffer.
pub type StdoutSink = Box<dyn AsyncWrite + Send + Unpin>;

/// How long output keeps draining after the child was told to stop.
const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
enum Stop {
    Deadline(Duration),
    Killed,
}

// ============================================================================
// Process Runner
// ============================================================================

/// Runs a program with preset arguments and captures its output.
///
/// Preset arguments, environment, timeout and stdout sink persist across
/// runs until [`reset`](Self::reset). A stdin source is consumed by the run
/// that uses it.
#[derive(Default)]
pub struct ProcessRunner {
    args: Vec<String>,
    env: Option<Vec<(String, String)>>,
    stdin: Option<StdinSource>,
    stdout_sink: Option<StdoutSink>,
    timeout: Option<Duration>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    kill_switch: KillSwitch,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("args", &self.args)
            .field("env", &self.env)
            .field("has_stdin", &self.stdin.is_some())
            .field("has_stdout_sink", &self.stdout_sink.is_some())
            .field("timeout", &self.timeout)
            .field("stdout_len", &self.stdout.len())
            .field("stderr_len", &self.stderr.len())
            .finish()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a preset argument.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends preset arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the child environment with exactly `vars`.
    ///
    /// Without this call the child inherits the current environment.
    pub fn env<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Feeds `source` to the next run's stdin.
    pub fn stdin(&mut self, source: StdinSource) -> &mut Self {
        self.stdin = Some(source);
        self
    }

    /// Sends stdout to `sink` instead of capturing it.
    pub fn stdout_to(&mut self, sink: StdoutSink) -> &mut Self {
        self.stdout_sink = Some(sink);
        self
    }

    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn preset_args(&self) -> &[String] {
        &self.args
    }

    pub fn env_vars(&self) -> Option<&[(String, String)]> {
        self.env.as_deref()
    }

    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    /// Captured stdout of the last run. Empty when a sink was configured.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Captured stderr of the last run.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Returns captured stdout followed by captured stderr.
    pub fn combined_output(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        combined.extend_from_slice(&self.stdout);
        combined.extend_from_slice(&self.stderr);
        combined
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    /// Terminates the live process, if any. See [`KillSwitch::kill`].
    pub fn kill(&self) -> bool {
        self.kill_switch.kill()
    }

    /// Clears arguments, environment, stdio wiring, captured output and the
    /// live process handle. The timeout is kept.
    pub fn reset(&mut self) {
        self.args.clear();
        self.env = None;
        self.stdin = None;
        self.stdout_sink = None;
        self.stdout.clear();
        self.stderr.clear();
        self.kill_switch.set(None);
    }

    /// Runs `program` with the preset arguments followed by `extra_args`.
    ///
    /// Returns once the process has been reaped. Captured output is
    /// available afterwards, also when the process failed.
    pub async fn run(&mut self, program: &Path, extra_args: &[&str]) -> Result<()> {
        self.stdout.clear();
        self.stderr.clear();

        let program = resolve_program(program);
        let stdin_source = self.stdin.take();

        let mut command = Command::new(&program);
        command
            .args(&self.args)
            .args(extra_args)
            .stdin(if stdin_source.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(vars) = &self.env {
            command.env_clear();
            command.envs(vars.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let mut child = command.spawn().map_err(|source| BinError::SpawnFailed {
            program: program.clone(),
            source,
        })?;
        debug!("Spawned {} (pid {:?})", program.display(), child.id());

        let terminate = Arc::new(Notify::new());
        self.kill_switch.set(Some(LiveProcess {
            pid: child.id(),
            terminate: terminate.clone(),
        }));

        let streams = drive_streams(
            stdin_source,
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
            self.stdout_sink.as_mut(),
            &mut self.stdout,
            &mut self.stderr,
        );
        let outcome = supervise(&mut child, streams, self.timeout, &terminate).await;

        self.kill_switch.set(None);
        outcome
    }
}

/// Resolves a bare program name against `PATH`, before any environment
/// override applies to the child. Names that cannot be resolved are returned
/// unchanged so the spawn reports the failure.
fn resolve_program(program: &Path) -> PathBuf {
    let is_bare = program
        .parent()
        .map_or(true, |parent| parent.as_os_str().is_empty());

    if is_bare {
        match which::which(program) {
            Ok(resolved) => return resolved,
            Err(e) => debug!("Could not resolve {} on PATH: {}", program.display(), e),
        }
    }

    program.to_path_buf()
}

// ============================================================================
// Stream Handling
// ============================================================================

/// Feeds stdin and drains stdout and stderr concurrently.
///
/// Reading the pipes one after another can deadlock once the child fills the
/// other pipe's buffer.
async fn drive_streams(
    stdin_source: Option<StdinSource>,
    stdin_pipe: Option<ChildStdin>,
    stdout_pipe: Option<ChildStdout>,
    stderr_pipe: Option<ChildStderr>,
    sink: Option<&mut StdoutSink>,
    stdout_buf: &mut Vec<u8>,
    stderr_buf: &mut Vec<u8>,
) -> Result<()> {
    let feed = feed_stdin(stdin_source, stdin_pipe);

    let out = async {
        match (stdout_pipe, sink) {
            (Some(mut pipe), Some(sink)) => match tokio::io::copy(&mut pipe, &mut *sink).await {
                Ok(_) => sink.flush().await,
                Err(e) => Err(e),
            },
            (Some(mut pipe), None) => pipe.read_to_end(stdout_buf).await.map(|_| ()),
            (None, _) => Ok(()),
        }
    };

    let err = async {
        match stderr_pipe {
            Some(mut pipe) => pipe.read_to_end(stderr_buf).await.map(|_| ()),
            None => Ok(()),
        }
    };

    let (fed, out, err) = tokio::join!(feed, out, err);

    out.map_err(|source| BinError::StreamReadFailed {
        stream: "stdout",
        source,
    })?;
    err.map_err(|source| BinError::StreamReadFailed {
        stream: "stderr",
        source,
    })?;
    fed.map_err(|source| BinError::StreamReadFailed {
        stream: "stdin",
        source,
    })
}

/// Copies `source` into the child's stdin and closes it.
///
/// A child that exits without reading all input is not an error.
async fn feed_stdin(source: Option<StdinSource>, pipe: Option<ChildStdin>) -> io::Result<()> {
    let (Some(mut source), Some(mut pipe)) = (source, pipe) else {
        return Ok(());
    };

    let result = match tokio::io::copy(&mut source, &mut pipe).await {
        Ok(bytes) => {
            debug!("Wrote {} bytes to stdin", bytes);
            pipe.shutdown().await
        }
        Err(e) => Err(e),
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Child closed stdin early");
            Ok(())
        }
        other => other,
    }
}

// ============================================================================
// Supervision
// ============================================================================

/// Waits for the streams and the child while watching the deadline and kill
/// requests. The child is always reaped before returning.
async fn supervise<F>(
    child: &mut Child,
    streams: F,
    timeout: Option<Duration>,
    terminate: &Notify,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::pin!(streams);

    let deadline = async move {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut stream_result = None;
    let mut stop = None;

    tokio::select! {
        biased;
        result = &mut streams => stream_result = Some(result),
        limit = &mut deadline => stop = Some(Stop::Deadline(limit)),
        _ = terminate.notified() => stop = Some(Stop::Killed),
    }

    // Streams closed; the child may still be running.
    let mut status = None;
    if stop.is_none() {
        tokio::select! {
            biased;
            result = child.wait() => status = Some(result),
            limit = &mut deadline => stop = Some(Stop::Deadline(limit)),
            _ = terminate.notified() => stop = Some(Stop::Killed),
        }
    }

    if let Some(reason) = stop {
        debug!("Stopping process: {:?}", reason);
        if let Err(e) = child.start_kill() {
            debug!("Kill signal not delivered: {}", e);
        }

        if stream_result.is_none() {
            match tokio::time::timeout(KILL_GRACE, &mut streams).await {
                Ok(result) => stream_result = Some(result),
                Err(_) => warn!("Output streams still open {:?} after kill", KILL_GRACE),
            }
        }
    }

    let status = match status {
        Some(status) => status,
        None => child.wait().await,
    };

    if let Some(Err(e)) = stream_result {
        return Err(e);
    }

    match stop {
        Some(Stop::Deadline(timeout)) => return Err(BinError::DeadlineExceeded { timeout }),
        Some(Stop::Killed) => return Err(BinError::Killed),
        None => {}
    }

    let status = status.map_err(|source| BinError::Wait { source })?;
    if status.success() {
        Ok(())
    } else {
        Err(BinError::ProcessExit { status })
    }
}

//! External command execution with streamed output and group cancellation.
//!
//! Each started command gets:
//! - its own process group, so a cancel reaches `uv` and anything it spawned
//! - one reader task per pipe, pushing lines into a shared channel
//! - one driver task that forwards lines, waits for exit and escalates
//!   SIGTERM to SIGKILL once the grace period runs out
//!
//! The caller sees a single ordered stream of [`RunEvent`]s ending with
//! exactly one [`RunEvent::Exited`].

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use uvdeck_core::{OutputLine, OutputStream};

use crate::error::RunnerError;

/// Upper bound on waiting for pipes to close after the child has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to run and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
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

    /// Shell-quoted command line for echoing into the output log.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            let quoted = shlex::try_quote(arg).unwrap_or(Cow::Borrowed(arg.as_str()));
            line.push(' ');
            line.push_str(&quoted);
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// `forced` when the group ignored SIGTERM and had to be killed.
    Cancelled { forced: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub status: RunStatus,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Output(OutputLine),
    Exited(CommandResult),
}

/// Receiving end of a started command.
#[derive(Debug)]
pub struct RunHandle {
    pid: Option<u32>,
    events: mpsc::UnboundedReceiver<RunEvent>,
}

impl RunHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next output line or the exit event. `None` once the driver has finished.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Discard output events and return the final result.
    pub async fn wait(mut self) -> Option<CommandResult> {
        while let Some(event) = self.events.recv().await {
            if let RunEvent::Exited(result) = event {
                return Some(result);
            }
        }
        None
    }
}

/// Launches commands and supervises them until exit.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    grace: Duration,
}

impl CommandRunner {
    /// `grace` is the time between SIGTERM and SIGKILL after a cancel.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Spawn `spec` and return a handle streaming its events.
    ///
    /// Cancelling `cancel` starts graceful termination of the process group.
    pub fn start(
        &self,
        spec: &CommandSpec,
        cancel: CancellationToken,
    ) -> Result<RunHandle, RunnerError> {
        if !spec.working_dir.is_dir() {
            return Err(RunnerError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("working directory {} does not exist", spec.working_dir.display()),
                ),
            });
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RunnerError::NotFound {
                    program: spec.program.clone(),
                }
            } else {
                RunnerError::Spawn {
                    program: spec.program.clone(),
                    source,
                }
            }
        })?;
        let pid = child.id();
        tracing::debug!(
            pid,
            command = %spec.display(),
            cwd = %spec.working_dir.display(),
            "spawned"
        );

        let (line_tx, line_rx) = mpsc::unbounded_channel::<OutputLine>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_stream(
                stdout,
                OutputStream::Stdout,
                line_tx.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_stream(stderr, OutputStream::Stderr, line_tx)));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel::<RunEvent>();
        let pipes = Pipes {
            lines: line_rx,
            readers,
        };
        tokio::spawn(drive(child, pipes, event_tx, cancel, self.grace));

        Ok(RunHandle {
            pid,
            events: event_rx,
        })
    }

    /// Run `spec` to completion without cancellation, collecting its output.
    pub async fn run_to_end(&self, spec: &CommandSpec) -> Result<CommandResult, RunnerError> {
        let handle = self.start(spec, CancellationToken::new())?;
        handle.wait().await.ok_or_else(|| RunnerError::Spawn {
            program: spec.program.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::Other,
                "process supervisor stopped before reporting an exit",
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Capture {
    stdout: String,
    stderr: String,
}

impl Capture {
    fn record(&mut self, line: &OutputLine) {
        let buf = match line.stream {
            OutputStream::Stderr => &mut self.stderr,
            _ => &mut self.stdout,
        };
        buf.push_str(&line.text);
        buf.push('\n');
    }
}

/// Output side of a child: merged lines plus the tasks reading each pipe.
struct Pipes {
    lines: mpsc::UnboundedReceiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
}

async fn drive(
    mut child: Child,
    pipes: Pipes,
    events: mpsc::UnboundedSender<RunEvent>,
    cancel: CancellationToken,
    grace: Duration,
) {
    let Pipes {
        mut lines,
        readers,
    } = pipes;
    let started = Instant::now();
    let pid = child.id();
    let mut capture = Capture::default();
    let mut lines_open = true;
    let mut cancel_requested = false;
    let mut forced = false;
    let mut kill_deadline: Option<Instant> = None;

    let wait_result = loop {
        tokio::select! {
            line = lines.recv(), if lines_open => match line {
                Some(line) => {
                    capture.record(&line);
                    let _ = events.send(RunEvent::Output(line));
                }
                None => lines_open = false,
            },
            status = child.wait() => break status,
            _ = cancel.cancelled(), if !cancel_requested => {
                cancel_requested = true;
                tracing::debug!(pid, "cancel requested, sending SIGTERM to process group");
                terminate(&mut child, pid);
                kill_deadline = Some(Instant::now() + grace);
            }
            _ = sleep_until(kill_deadline), if kill_deadline.is_some() => {
                forced = true;
                kill_deadline = None;
                let grace_ms = grace.as_millis() as u64;
                tracing::warn!(pid, grace_ms, "process ignored SIGTERM, killing");
                force_kill(&mut child, pid);
            }
        }
    };

    if lines_open {
        let drain = async {
            while let Some(line) = lines.recv().await {
                capture.record(&line);
                let _ = events.send(RunEvent::Output(line));
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            // A leftover grandchild holds the pipe; stop reading it.
            tracing::debug!(pid, "output pipes still open after exit, giving up on drain");
            for reader in &readers {
                reader.abort();
            }
        }
    }

    let (exit_code, success) = match &wait_result {
        Ok(status) => (status.code(), status.success()),
        Err(err) => {
            tracing::warn!(pid, error = %err, "failed to collect exit status");
            (None, false)
        }
    };
    let status = if cancel_requested {
        RunStatus::Cancelled { forced }
    } else if success {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };

    let _ = events.send(RunEvent::Exited(CommandResult {
        exit_code,
        stdout: capture.stdout,
        stderr: capture.stderr,
        status,
        duration: started.elapsed(),
    }));
}

async fn read_stream<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(&['\n', '\r'][..]).to_string();
                if tx.send(OutputLine { stream, text }).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "output pipe read failed");
                break;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(pid, ?signal, error = %err, "signal delivery failed");
            false
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child, pid: Option<u32>) {
    if !signal_group(pid, nix::sys::signal::Signal::SIGTERM) {
        let _ = child.start_kill();
    }
}

#[cfg(unix)]
fn force_kill(child: &mut Child, pid: Option<u32>) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}

// ─── Tests ────────────────────────────────────────────────────────────────────

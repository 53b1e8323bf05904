//! Test execution.
//!
//! Every test runs as its own process group with no arguments, the workspace
//! root as working directory and the parent's environment. Output streams
//! back as it is produced; the exit status decides the [`RunResult`].
//! Cancelling stops the whole group, children of the test included.

mod cancel;
mod kill;
mod output;

pub use cancel::CancelToken;
pub use kill::KillPolicy;
pub use output::OutputChunk;

use futures::StreamExt;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::config::{DEFAULT_OUTPUT_TAIL_CHARS, OUTPUT_DRAIN_TIMEOUT, OUTPUT_READ_BUFFER};
use output::{LineEndings, TailBuffer, Utf8Decoder};

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    /// Exited with code 0.
    Passed { duration: Duration },
    /// Exited nonzero or was killed by a signal.
    Failed { duration: Duration, message: String },
    /// Could not be launched, or was cancelled.
    Errored { message: String },
}

impl RunResult {
    pub fn is_passed(&self) -> bool {
        matches!(self, RunResult::Passed { .. })
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            RunResult::Passed { duration } | RunResult::Failed { duration, .. } => Some(*duration),
            RunResult::Errored { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            RunResult::Passed { .. } => None,
            RunResult::Failed { message, .. } | RunResult::Errored { message } => Some(message),
        }
    }
}

/// Launches test executables.
#[derive(Debug, Clone)]
pub struct Executor {
    cwd: PathBuf,
    tail_chars: usize,
    kill_policy: KillPolicy,
}

impl Executor {
    /// Creates an executor that runs tests from `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            tail_chars: DEFAULT_OUTPUT_TAIL_CHARS,
            kill_policy: KillPolicy::default(),
        }
    }

    pub fn with_kill_policy(mut self, policy: KillPolicy) -> Self {
        self.kill_policy = policy;
        self
    }

    /// Sets how much trailing output failure messages carry.
    pub fn with_tail_chars(mut self, chars: usize) -> Self {
        self.tail_chars = chars;
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Starts `program` in the background.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self, program: &Path, cancel: CancelToken) -> Execution {
        let (tx, rx) = mpsc::unbounded_channel();
        let job = ChildJob {
            program: program.to_path_buf(),
            cwd: self.cwd.clone(),
            tail_chars: self.tail_chars,
            kill_policy: self.kill_policy,
        };
        let outcome = tokio::spawn(job.run(cancel, tx));

        Execution {
            output: UnboundedReceiverStream::new(rx),
            outcome,
        }
    }

    /// Runs `program` to completion, handing each output chunk to `on_output`.
    pub async fn run<F>(&self, program: &Path, cancel: CancelToken, on_output: F) -> RunResult
    where
        F: FnMut(&OutputChunk),
    {
        self.start(program, cancel).drive(on_output).await
    }
}

/// A running test: a stream of output plus a final result.
pub struct Execution {
    output: UnboundedReceiverStream<OutputChunk>,
    outcome: JoinHandle<RunResult>,
}

impl Execution {
    /// Output chunks in arrival order. Ends when the test's pipes close.
    pub fn output(&mut self) -> &mut UnboundedReceiverStream<OutputChunk> {
        &mut self.output
    }

    /// Waits for the result, discarding unread output.
    pub async fn outcome(self) -> RunResult {
        match self.outcome.await {
            Ok(result) => result,
            Err(err) => RunResult::Errored {
                message: format!("Test task failed: {err}"),
            },
        }
    }

    /// Forwards all output to `on_output`, then returns the result.
    pub async fn drive<F>(mut self, mut on_output: F) -> RunResult
    where
        F: FnMut(&OutputChunk),
    {
        while let Some(chunk) = self.output.next().await {
            on_output(&chunk);
        }
        self.outcome().await
    }
}

struct ChildJob {
    program: PathBuf,
    cwd: PathBuf,
    tail_chars: usize,
    kill_policy: KillPolicy,
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Cancelled(Signal),
}

impl ChildJob {
    async fn run(self, cancel: CancelToken, tx: mpsc::UnboundedSender<OutputChunk>) -> RunResult {
        let started = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return RunResult::Errored {
                    message: format!("Failed to launch {}: {err}", self.program.display()),
                }
            }
        };

        let Some(pid) = child.id() else {
            return RunResult::Errored {
                message: format!("{} exited before it could be tracked", self.program.display()),
            };
        };
        // process_group(0) makes the child its own group leader
        let pgid = Pid::from_raw(pid as i32);
        debug!("Started {} as process group {}", self.program.display(), pgid);

        let stdout_tail = Arc::new(Mutex::new(TailBuffer::new(self.tail_chars)));
        let stderr_tail = Arc::new(Mutex::new(TailBuffer::new(self.tail_chars)));
        let stdout_task = tokio::spawn(pump(
            child.stdout.take(),
            tx.clone(),
            OutputChunk::Stdout,
            stdout_tail.clone(),
        ));
        let stderr_task = tokio::spawn(pump(
            child.stderr.take(),
            tx,
            OutputChunk::Stderr,
            stderr_tail.clone(),
        ));

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = cancel.cancelled() => {
                Ending::Cancelled(kill::terminate_group(&mut child, pgid, &self.kill_policy).await)
            }
        };
        let duration = started.elapsed();

        drain(stdout_task).await;
        drain(stderr_task).await;
        let stdout = take_tail(&stdout_tail);
        let stderr = take_tail(&stderr_tail);

        match ending {
            Ending::Cancelled(signal) => RunResult::Errored {
                message: format!("Cancelled; process group stopped with {signal}"),
            },
            Ending::Exited(Err(err)) => RunResult::Errored {
                message: format!("Failed to wait for {}: {err}", self.program.display()),
            },
            Ending::Exited(Ok(status)) => interpret_status(status, duration, &stderr, &stdout, self.tail_chars),
        }
    }
}

fn interpret_status(
    status: ExitStatus,
    duration: Duration,
    stderr: &(String, bool),
    stdout: &(String, bool),
    tail_chars: usize,
) -> RunResult {
    let headline = match (status.code(), status.signal()) {
        (Some(0), _) => return RunResult::Passed { duration },
        (Some(code), _) => format!("Exited with code {code}"),
        (None, Some(sig)) => format!("Terminated by signal {}", signal_name(sig)),
        (None, None) => format!("Exited abnormally ({status})"),
    };

    let mut message = headline;
    for (name, (text, truncated)) in [("stderr", stderr), ("stdout", stdout)] {
        if text.trim().is_empty() {
            continue;
        }
        let heading = if *truncated {
            format!("{name} (last {tail_chars} characters)")
        } else {
            name.to_string()
        };
        message.push_str(&format!("\n\n--- {heading} ---\n{}", text.trim_end()));
    }

    RunResult::Failed { duration, message }
}

/// Name of a signal number, e.g. `SIGSEGV`.
pub fn signal_name(sig: i32) -> String {
    Signal::try_from(sig)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {sig}"))
}

async fn pump<R>(
    reader: Option<R>,
    tx: mpsc::UnboundedSender<OutputChunk>,
    wrap: fn(String) -> OutputChunk,
    tail: Arc<Mutex<TailBuffer>>,
) where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut decoder = Utf8Decoder::default();
    let mut endings = LineEndings::default();
    let mut buf = vec![0u8; OUTPUT_READ_BUFFER];

    loop {
        let text = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => decoder.push(&buf[..n]),
        };
        if text.is_empty() {
            continue;
        }
        lock(&tail).push(&text);
        let normalized = endings.normalize(&text);
        if !normalized.is_empty() {
            let _ = tx.send(wrap(normalized));
        }
    }

    let rest = decoder.finish();
    lock(&tail).push(&rest);
    let mut normalized = endings.normalize(&rest);
    normalized.push_str(&endings.finish());
    if !normalized.is_empty() {
        let _ = tx.send(wrap(normalized));
    }
}

/// Gives a reader a bounded time to hit EOF.
///
/// A background grandchild can hold the pipe open after the test exits.
async fn drain(mut task: JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut task).await.is_err() {
        debug!("Output still open after exit; detaching reader");
        task.abort();
    }
}

fn lock(tail: &Mutex<TailBuffer>) -> std::sync::MutexGuard<'_, TailBuffer> {
    tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_tail(tail: &Mutex<TailBuffer>) -> (String, bool) {
    let mut guard = lock(tail);
    std::mem::replace(&mut *guard, TailBuffer::new(0)).finish()
}

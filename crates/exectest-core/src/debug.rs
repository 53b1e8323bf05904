//! Handing a test binary off to an external debugger.
//!
//! Only the launch is observed: a debugger that starts counts as a passed
//! "run", one that cannot start counts as errored. What happens inside the
//! debug session is not tracked.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::info;

use crate::exec::RunResult;
use crate::tree::TestLeaf;

/// Errors starting a debug session.
#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Failed to launch {debugger} for {}: {source}", program.display())]
    Launch {
        debugger: String,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Debug target does not exist: {}", .0.display())]
    MissingTarget(PathBuf),
}

/// Which debugger to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebuggerBackend {
    #[default]
    Gdb,
    Lldb,
}

impl DebuggerBackend {
    /// Backend identifier as written in configuration.
    pub fn id(&self) -> &'static str {
        match self {
            DebuggerBackend::Gdb => "gdb",
            DebuggerBackend::Lldb => "lldb",
        }
    }

    /// Program and arguments that launch `target` under this debugger.
    pub fn command_line(&self, target: &Path) -> (String, Vec<String>) {
        let target = target.to_string_lossy().to_string();
        match self {
            DebuggerBackend::Gdb => ("gdb".to_string(), vec!["--args".to_string(), target]),
            DebuggerBackend::Lldb => ("lldb".to_string(), vec!["--".to_string(), target]),
        }
    }
}

impl FromStr for DebuggerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gdb" => Ok(DebuggerBackend::Gdb),
            "lldb" => Ok(DebuggerBackend::Lldb),
            other => Err(format!("unknown debugger {other:?}, expected \"gdb\" or \"lldb\"")),
        }
    }
}

/// What a debugger needs to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchDescriptor {
    pub program: PathBuf,
    pub cwd: PathBuf,
    pub backend: DebuggerBackend,
}

/// Something that can start a debug session.
#[async_trait]
pub trait Debugger: Send + Sync {
    async fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), DebugError>;
}

/// Starts debuggers as child processes attached to the terminal.
///
/// By default launched sessions are kept so the host can wait for them with
/// [`CommandDebugger::wait_all`]. A [`CommandDebugger::sequential`] debugger
/// instead waits for each session to end before `launch` returns, so only
/// one debugger owns the terminal at a time.
#[derive(Default)]
pub struct CommandDebugger {
    sessions: Mutex<Vec<Child>>,
    wait: bool,
    program: Option<PathBuf>,
}

impl CommandDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A debugger whose `launch` returns once the session has ended.
    pub fn sequential() -> Self {
        Self {
            wait: true,
            ..Self::default()
        }
    }

    /// Runs `program` instead of the backend's usual executable, keeping its arguments.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Waits for every launched session to end.
    pub async fn wait_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for mut child in sessions.drain(..) {
            let _ = child.wait().await;
        }
    }
}

#[async_trait]
impl Debugger for CommandDebugger {
    async fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), DebugError> {
        if !descriptor.program.exists() {
            return Err(DebugError::MissingTarget(descriptor.program.clone()));
        }

        let (default_program, args) = descriptor.backend.command_line(&descriptor.program);
        let program = match &self.program {
            Some(path) => path.to_string_lossy().to_string(),
            None => default_program,
        };
        let launch_error = |source: std::io::Error| DebugError::Launch {
            debugger: program.clone(),
            program: descriptor.program.clone(),
            source,
        };

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&descriptor.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(launch_error)?;

        info!("Started {} for {}", program, descriptor.program.display());
        if self.wait {
            let status = child.wait().await.map_err(launch_error)?;
            info!("{} exited with {}", program, status);
        } else {
            self.sessions.lock().await.push(child);
        }
        Ok(())
    }
}

/// Asks `debugger` to start a session for `leaf`.
pub async fn debug_leaf(
    debugger: &dyn Debugger,
    leaf: &TestLeaf,
    cwd: &Path,
    backend: DebuggerBackend,
) -> RunResult {
    let descriptor = LaunchDescriptor {
        program: leaf.executable.clone(),
        cwd: cwd.to_path_buf(),
        backend,
    };

    match debugger.launch(&descriptor).await {
        Ok(()) => RunResult::Passed {
            duration: Duration::ZERO,
        },
        Err(err) => RunResult::Errored {
            message: err.to_string(),
        },
    }
}

//! Process-group termination with graduated escalation.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tracing::debug;

use crate::config::{DEFAULT_INTERRUPT_GRACE, DEFAULT_KILL_DEADLINE, GROUP_POLL_INTERVAL};

/// When to escalate from SIGINT to SIGTERM to SIGKILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillPolicy {
    /// Time after SIGINT before SIGTERM is sent.
    pub interrupt_grace: Duration,
    /// Time after SIGINT before SIGKILL is sent.
    pub kill_deadline: Duration,
}

impl Default for KillPolicy {
    fn default() -> Self {
        Self {
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
            kill_deadline: DEFAULT_KILL_DEADLINE,
        }
    }
}

/// Stops every process in `pgid`, returning the last signal sent.
///
/// `child` must be the group leader; it is reaped along the way so the
/// liveness check does not see it as a zombie.
pub(crate) async fn terminate_group(child: &mut Child, pgid: Pid, policy: &KillPolicy) -> Signal {
    let started = Instant::now();

    signal_group(pgid, Signal::SIGINT);
    if wait_for_group(child, pgid, policy.interrupt_grace).await {
        return Signal::SIGINT;
    }

    signal_group(pgid, Signal::SIGTERM);
    let remaining = policy.kill_deadline.saturating_sub(started.elapsed());
    if wait_for_group(child, pgid, remaining).await {
        return Signal::SIGTERM;
    }

    signal_group(pgid, Signal::SIGKILL);
    let _ = child.wait().await;
    wait_for_group(child, pgid, policy.kill_deadline).await;
    Signal::SIGKILL
}

fn signal_group(pgid: Pid, signal: Signal) {
    debug!("Sending {} to process group {}", signal, pgid);
    if let Err(err) = killpg(pgid, signal) {
        if err != Errno::ESRCH {
            debug!("Failed to signal process group {}: {}", pgid, err);
        }
    }
}

/// Whether any process of the group still exists.
pub(crate) fn group_alive(pgid: Pid) -> bool {
    !matches!(killpg(pgid, None), Err(Errno::ESRCH))
}

async fn wait_for_group(child: &mut Child, pgid: Pid, timeout: Duration) -> bool {
    let started = Instant::now();
    loop {
        let _ = child.try_wait();
        if !group_alive(pgid) {
            return true;
        }
        if started.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
}

//! Process control capability.
//!
//! # Responsibilities
//! - Send a termination signal to a pid
//! - Spawn the replacement through the platform shell
//! - Resolve a handle to its exit code
//!
//! # Design Decisions
//! - `ProcessControl` is a trait so the restart sequence can be driven by a
//!   scripted double under test
//! - A pid that no longer exists counts as terminated
//! - Only children spawned by this process can be waited on

use std::io;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid pid {0}")]
    InvalidPid(u32),

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for pid {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("pid {0} was not spawned by this process")]
    NotChild(u32),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// A process the supervisor knows about.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Option<Child>,
}

impl ProcessHandle {
    /// A process started elsewhere. It can be signalled but not awaited.
    pub fn detached(pid: u32) -> Self {
        Self { pid, child: None }
    }

    fn spawned(pid: u32, child: Child) -> Self {
        Self {
            pid,
            child: Some(child),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Terminate, spawn and await processes.
pub trait ProcessControl: Send + Sync {
    fn terminate(&self, pid: u32) -> Result<(), ProcessError>;

    fn spawn(&self, command: &str) -> Result<ProcessHandle, ProcessError>;

    /// Resolves to the exit code, or `None` when the process was killed by
    /// a signal.
    fn wait_exit(&self, handle: ProcessHandle) -> BoxFuture<'static, Result<Option<i32>, ProcessError>>;
}

/// `ProcessControl` backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        let raw = libc::pid_t::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or(ProcessError::InvalidPid(pid))?;

        // SAFETY: kill(2) only takes integer arguments.
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == 0 {
            return Ok(());
        }

        let source = io::Error::last_os_error();
        if source.raw_os_error() == Some(libc::ESRCH) {
            tracing::debug!(pid, "Process already gone");
            return Ok(());
        }
        Err(ProcessError::Signal { pid, source })
    }

    #[cfg(not(unix))]
    fn terminate(&self, _pid: u32) -> Result<(), ProcessError> {
        Err(ProcessError::Unsupported("signalling another process"))
    }

    fn spawn(&self, command: &str) -> Result<ProcessHandle, ProcessError> {
        let spawn_error = |source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        };

        let child = shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        let pid = child
            .id()
            .ok_or_else(|| spawn_error(io::Error::other("process exited before its pid was read")))?;

        Ok(ProcessHandle::spawned(pid, child))
    }

    fn wait_exit(&self, handle: ProcessHandle) -> BoxFuture<'static, Result<Option<i32>, ProcessError>> {
        Box::pin(async move {
            let pid = handle.pid;
            let mut child = handle.child.ok_or(ProcessError::NotChild(pid))?;
            let status = child
                .wait()
                .await
                .map_err(|source| ProcessError::Wait { pid, source })?;
            Ok(status.code())
        })
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

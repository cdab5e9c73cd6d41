//! The process-spawn primitive.
//!
//! The engine only needs three byte streams, a way to signal the process and an
//! eventual exit code, so spawning sits behind [`ProcessSpawner`]. [`TokioSpawner`]
//! is the default and runs real subprocesses, each leading its own process
//! group so that signals also reach whatever the process started itself.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tracing::debug;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to start one subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub runner: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Layered over the inherited environment.
    pub env: BTreeMap<String, String>,
}

/// Delivers signals to a spawned process.
pub trait Signaller: Send + Sync {
    fn signal(&self, signal: Signal) -> io::Result<()>;
}

/// A freshly spawned process.
pub struct SpawnedChild {
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
    pub signaller: Box<dyn Signaller>,
    /// Resolves once the process terminated; `None` when it has no exit code.
    pub exit: BoxFuture<'static, io::Result<Option<i32>>>,
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, request: &SpawnRequest) -> io::Result<SpawnedChild>;
}

/// Spawns real subprocesses with piped stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl TokioSpawner {
    pub fn new() -> Self {
        Self
    }
}

/// Signals the whole process group led by the spawned child.
struct GroupSignaller {
    pgid: Pid,
}

impl Signaller for GroupSignaller {
    fn signal(&self, sig: Signal) -> io::Result<()> {
        signal::killpg(self.pgid, sig).map_err(io::Error::from)
    }
}

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, request: &SpawnRequest) -> io::Result<SpawnedChild> {
        let mut command = Command::new(&request.runner);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(false);

        let mut child = command.spawn()?;

        let missing = |name: &str| io::Error::other(format!("child {name} was not captured"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("child exited before its pid was read"))?;

        debug!(pid, runner = %request.runner, "spawned subprocess");

        Ok(SpawnedChild {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            signaller: Box::new(GroupSignaller {
                pgid: Pid::from_raw(pid as i32),
            }),
            exit: Box::pin(async move {
                let status = child.wait().await?;
                Ok::<_, io::Error>(status.code())
            }),
        })
    }
}

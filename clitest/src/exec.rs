//! Launching subprocesses and routing their output.
//!
//! [`launch`] starts one process through a [`ProcessSpawner`], fills the given
//! [`ProcessSlot`] and spawns three tasks: one pump per output stream and a
//! supervisor that reaps the process. Once reaped the process is no longer
//! signalled through its slot. The supervisor publishes [`ExitState`]
//! only after both pumps drained (or the drain timeout elapsed), so anyone
//! observing `Exited` also observes the complete output history.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::output::{Output, Stream};
use crate::slot::{LiveProcess, ProcessSlot};
use crate::spawner::{BoxedReader, ProcessSpawner, SpawnRequest};

const READ_BUFFER_SIZE: usize = 8192;

/// Exit state of one execution, written once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitState {
    #[default]
    Running,
    /// `code` is `None` when the process was terminated by a signal.
    Exited { code: Option<i32> },
}

impl ExitState {
    pub fn is_exited(&self) -> bool {
        matches!(self, ExitState::Exited { .. })
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitState::Exited { code } => *code,
            ExitState::Running => None,
        }
    }
}

/// Result of running a command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// `None` if the process was still running when the timeout fired or was
    /// killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Working directory relative to the environment directory.
    pub run_from: Option<PathBuf>,
    /// Resolve with `exit_code: None` once this elapses.
    pub timeout: Option<Duration>,
    /// Layered over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_from(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_from = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub run_from: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_from(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_from = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Build a spawn request from a shell-style command string.
pub(crate) fn build_request(
    runner: &str,
    command: &str,
    dir: PathBuf,
    run_from: Option<PathBuf>,
    env: BTreeMap<String, String>,
) -> Result<SpawnRequest> {
    let args = shlex::split(command).ok_or_else(|| Error::InvalidCommand(command.to_string()))?;
    let cwd = match run_from {
        Some(relative) => dir.join(relative),
        None => dir,
    };
    Ok(SpawnRequest {
        runner: runner.to_string(),
        args,
        cwd,
        env,
    })
}

/// One launched process: its output, exit state and slot.
#[derive(Debug, Clone)]
pub(crate) struct Execution {
    pub(crate) output: Arc<Output>,
    pub(crate) exit: watch::Receiver<ExitState>,
    pub(crate) slot: ProcessSlot,
}

pub(crate) fn launch(
    spawner: &dyn ProcessSpawner,
    request: &SpawnRequest,
    slot: ProcessSlot,
    drain_timeout: Duration,
) -> Result<Execution> {
    let child = spawner.spawn(request).map_err(|source| Error::Launch {
        runner: request.runner.clone(),
        source,
    })?;
    info!(runner = %request.runner, args = ?request.args, cwd = %request.cwd.display(), "Launched process");

    let output = Arc::new(Output::new());
    let stdout = tokio::spawn(pump(child.stdout, Stream::Stdout, output.clone()));
    let stderr = tokio::spawn(pump(child.stderr, Stream::Stderr, output.clone()));

    let (exit_tx, exit_rx) = watch::channel(ExitState::Running);
    slot.occupy(
        LiveProcess {
            signaller: child.signaller,
            stdin: child.stdin,
            pumps: vec![stdout.abort_handle(), stderr.abort_handle()],
        },
        exit_rx.clone(),
    );

    let runner = request.runner.clone();
    let supervised = slot.clone();
    let exit = child.exit;
    tokio::spawn(async move {
        let code = match exit.await {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed to wait for {}: {}", runner, e);
                None
            }
        };
        supervised.mark_reaped();

        let mut pumps = [stdout, stderr];
        if tokio::time::timeout(drain_timeout, join_all(pumps.iter_mut()))
            .await
            .is_err()
        {
            debug!(%runner, "output still open after exit, closing pumps");
            for pump in &pumps {
                pump.abort();
            }
        }

        supervised.release();
        debug!(%runner, ?code, "process exited");
        exit_tx.send_replace(ExitState::Exited { code });
    });

    Ok(Execution {
        output,
        exit: exit_rx,
        slot,
    })
}

impl Execution {
    pub(crate) fn exit_state(&self) -> ExitState {
        *self.exit.borrow()
    }

    /// Wait for the process to exit, or for `timeout` if given.
    ///
    /// The process is left running when the timeout fires.
    pub(crate) async fn finish(&self, timeout: Option<Duration>) -> ExecResult {
        let mut exit = self.exit.clone();
        let exited = exit.wait_for(ExitState::is_exited);
        let state = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exited).await {
                Ok(Ok(state)) => *state,
                Ok(Err(_)) | Err(_) => self.exit_state(),
            },
            None => match exited.await {
                Ok(state) => *state,
                Err(_) => self.exit_state(),
            },
        };

        ExecResult {
            exit_code: state.code(),
            stdout: self.output.stdout(),
            stderr: self.output.stderr(),
        }
    }

    /// Mirror every chunk to the real stdout/stderr.
    pub(crate) fn mirror(&self) {
        self.output.subscribe(|chunk| {
            let result = match chunk.stream {
                Stream::Stdout => {
                    let mut out = io::stdout().lock();
                    out.write_all(chunk.text.as_bytes()).and_then(|_| out.flush())
                }
                Stream::Stderr => {
                    let mut err = io::stderr().lock();
                    err.write_all(chunk.text.as_bytes()).and_then(|_| err.flush())
                }
            };
            if let Err(e) = result {
                debug!("failed to mirror {}: {}", chunk.stream, e);
            }
        });
    }
}

async fn pump(mut reader: BoxedReader, stream: Stream, output: Arc<Output>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    output.append(stream, &text);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("error reading {}: {}", stream, e);
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        output.append(stream, &tail);
    }
    output.finish(stream);
}

/// Incremental UTF-8 decoding that carries incomplete sequences over to the
/// next read. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawner::TokioSpawner;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decoder_carries_split_sequences() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "✔ done".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..2]), "");
        assert_eq!(decoder.decode(&bytes[2..]), "✔ done");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"c\xe2\x9c"), "c");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_build_request_splits_command() {
        let request = build_request(
            "node",
            "cli.js print 'hello world' --verbose",
            PathBuf::from("/tmp/env"),
            Some(PathBuf::from("nested")),
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(request.args, vec!["cli.js", "print", "hello world", "--verbose"]);
        assert_eq!(request.cwd, PathBuf::from("/tmp/env/nested"));
    }

    #[test]
    fn test_build_request_rejects_unbalanced_quotes() {
        let err = build_request("sh", "-c 'echo", PathBuf::from("/"), None, BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[test]
    fn test_options_builders() {
        let options = ExecuteOptions::new()
            .run_from("sub")
            .timeout(Duration::from_millis(10))
            .env("A", "1");
        assert_eq!(options.run_from, Some(PathBuf::from("sub")));
        assert_eq!(options.timeout, Some(Duration::from_millis(10)));
        assert_eq!(options.env.get("A").map(String::as_str), Some("1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_state_is_published_after_output() {
        let request = build_request(
            "sh",
            "-c 'echo out; echo err >&2; exit 3'",
            std::env::temp_dir(),
            None,
            BTreeMap::new(),
        )
        .unwrap();
        let slot = ProcessSlot::empty();
        let execution =
            launch(&TokioSpawner::new(), &request, slot.clone(), Duration::from_secs(1)).unwrap();

        let result = execution.finish(None).await;
        assert_eq!(
            result,
            ExecResult {
                exit_code: Some(3),
                stdout: vec!["out".to_string()],
                stderr: vec!["err".to_string()],
            }
        );
        assert!(!slot.is_live());
        assert_eq!(execution.exit_state(), ExitState::Exited { code: Some(3) });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_finish_timeout_leaves_process_running() {
        let request =
            build_request("sleep", "30", std::env::temp_dir(), None, BTreeMap::new()).unwrap();
        let slot = ProcessSlot::empty();
        let execution =
            launch(&TokioSpawner::new(), &request, slot.clone(), Duration::from_secs(1)).unwrap();

        let result = execution.finish(Some(Duration::from_millis(50))).await;
        assert_eq!(result.exit_code, None);
        assert!(slot.is_live());

        assert!(slot.terminate());
        assert!(slot.wait_exited(Duration::from_secs(5)).await);
        assert_eq!(execution.exit_state(), ExitState::Exited { code: None });
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let request = build_request(
            "clitest-definitely-missing",
            "",
            std::env::temp_dir(),
            None,
            BTreeMap::new(),
        )
        .unwrap();
        let slot = ProcessSlot::empty();
        let err = launch(&TokioSpawner::new(), &request, slot.clone(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::Launch { ref runner, .. } if runner == "clitest-definitely-missing"));
        assert!(!slot.is_live());
    }
}

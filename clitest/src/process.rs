use std::time::Duration;

use nix::sys::signal::Signal;

use crate::error::Result;
use crate::exec::{ExecResult, Execution};
use crate::keys::Key;
use crate::registry::JobId;
use crate::wait::{self, TextWaitOutcome, WaitForTextOptions};

/// Handle to a process started with [`Environment::spawn`](crate::Environment::spawn).
///
/// Dropping the handle does not stop the process; the environment's cleanup
/// still reaches it.
#[derive(Debug, Clone)]
pub struct SpawnedProcess {
    job_id: JobId,
    execution: Execution,
    wait_timeout: Duration,
}

impl SpawnedProcess {
    pub(crate) fn new(job_id: JobId, execution: Execution, wait_timeout: Duration) -> Self {
        Self {
            job_id,
            execution,
            wait_timeout,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Sleep for `delay`.
    pub async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Wait until `target` shows up in the output, the process exits, or the
    /// timeout elapses.
    pub async fn wait_for_text(
        &self,
        target: &str,
        options: WaitForTextOptions,
    ) -> Result<TextWaitOutcome> {
        wait::wait_for_text(
            &self.execution.output,
            &self.execution.exit,
            target,
            &options,
            self.wait_timeout,
        )
        .await
    }

    /// Close stdin and wait for the process to exit, or for `timeout`.
    pub async fn wait_for_finish(&self, timeout: Option<Duration>) -> ExecResult {
        self.execution.slot.close_stdin().await;
        self.execution.finish(timeout).await
    }

    pub async fn write_text(&self, text: &str) {
        self.execution.slot.write(text.as_bytes()).await;
    }

    /// Press a key by name, e.g. `"enter"` or `"arrowDown"`.
    pub async fn press_key(&self, name: &str) -> Result<()> {
        let key: Key = name.parse()?;
        self.press(key).await;
        Ok(())
    }

    pub async fn press(&self, key: Key) {
        self.execution.slot.write(key.bytes()).await;
    }

    pub fn kill(&self, signal: Signal) {
        self.execution.slot.signal(signal);
    }

    /// Mirror the output of this process to the real stdout and stderr.
    pub fn debug(&self) {
        self.execution.mirror();
    }

    pub fn stdout(&self) -> Vec<String> {
        self.execution.output.stdout()
    }

    pub fn stderr(&self) -> Vec<String> {
        self.execution.output.stderr()
    }

    /// `None` while running and after a signal-caused exit.
    pub fn exit_code(&self) -> Option<i32> {
        self.execution.exit_state().code()
    }

    pub fn has_exited(&self) -> bool {
        self.execution.exit_state().is_exited()
    }
}

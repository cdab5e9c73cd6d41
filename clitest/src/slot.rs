//! Ownership cell for "the current process of one execution".
//!
//! The execution engine fills a slot when the process starts and clears it when
//! the process terminates. The job registry keeps every slot of a job so that
//! cleanup can still reach processes the caller no longer holds a handle to.
//! Both sides tolerate finding the slot empty.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::exec::ExitState;
use crate::spawner::{BoxedWriter, Signaller};

type SharedStdin = Arc<tokio::sync::Mutex<Option<BoxedWriter>>>;

pub(crate) struct LiveProcess {
    pub(crate) signaller: Box<dyn Signaller>,
    pub(crate) stdin: BoxedWriter,
    pub(crate) pumps: Vec<AbortHandle>,
}

struct Occupant {
    /// Dropped once the process is reaped, its pid may be reused after that.
    signaller: Option<Arc<dyn Signaller>>,
    stdin: SharedStdin,
    pumps: Vec<AbortHandle>,
}

#[derive(Default)]
struct SlotState {
    occupant: Option<Occupant>,
    exit: Option<watch::Receiver<ExitState>>,
}

#[derive(Clone, Default)]
pub(crate) struct ProcessSlot {
    state: Arc<Mutex<SlotState>>,
}

impl fmt::Debug for ProcessSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSlot")
            .field("live", &self.is_live())
            .finish()
    }
}

impl ProcessSlot {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn occupy(&self, process: LiveProcess, exit: watch::Receiver<ExitState>) {
        let mut state = self.state.lock().unwrap();
        state.occupant = Some(Occupant {
            signaller: Some(Arc::from(process.signaller)),
            stdin: Arc::new(tokio::sync::Mutex::new(Some(process.stdin))),
            pumps: process.pumps,
        });
        state.exit = Some(exit);
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state.lock().unwrap().occupant.is_some()
    }

    /// Stop signalling a process that has been reaped.
    ///
    /// Stdin and the pumps stay reachable until [`release`](Self::release).
    pub(crate) fn mark_reaped(&self) {
        if let Some(occupant) = self.state.lock().unwrap().occupant.as_mut() {
            occupant.signaller = None;
        }
    }

    /// Clear the slot after the process terminated on its own.
    pub(crate) fn release(&self) {
        if self.state.lock().unwrap().occupant.take().is_some() {
            debug!("process slot released");
        }
    }

    /// Signal the process. No-op when the slot is empty.
    pub(crate) fn signal(&self, signal: Signal) {
        let signaller = match &self.state.lock().unwrap().occupant {
            Some(Occupant {
                signaller: Some(signaller),
                ..
            }) => signaller.clone(),
            _ => return,
        };
        if let Err(e) = signaller.signal(signal) {
            debug!("failed to send {} to process: {}", signal, e);
        }
    }

    fn stdin(&self) -> Option<SharedStdin> {
        self.state
            .lock()
            .unwrap()
            .occupant
            .as_ref()
            .map(|occupant| occupant.stdin.clone())
    }

    /// Write `bytes` to the process and flush. No-op when the slot is empty
    /// or stdin was already closed.
    pub(crate) async fn write(&self, bytes: &[u8]) {
        let Some(stdin) = self.stdin() else {
            return;
        };
        let mut guard = stdin.lock().await;
        let Some(writer) = guard.as_mut() else {
            return;
        };
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            debug!("write to process stdin failed: {}", e);
        }
    }

    /// Close the process's stdin so readers observe end of file.
    pub(crate) async fn close_stdin(&self) {
        let Some(stdin) = self.stdin() else {
            return;
        };
        let writer = stdin.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("closing process stdin failed: {}", e);
            }
        }
    }

    /// Force-kill the process, release its streams and clear the slot.
    ///
    /// Returns `false` when the slot was already empty.
    pub(crate) fn terminate(&self) -> bool {
        let Some(occupant) = self.state.lock().unwrap().occupant.take() else {
            return false;
        };

        if let Some(signaller) = &occupant.signaller {
            if let Err(e) = signaller.signal(Signal::SIGKILL) {
                debug!("kill during cleanup failed: {}", e);
            }
        }
        // A writer in the middle of a write keeps stdin until it finishes.
        if let Ok(mut stdin) = occupant.stdin.try_lock() {
            stdin.take();
        }
        for pump in &occupant.pumps {
            pump.abort();
        }
        true
    }

    /// Wait until the process of this slot has been reaped.
    ///
    /// Returns `false` on timeout.
    pub(crate) async fn wait_exited(&self, timeout: Duration) -> bool {
        let exit = self.state.lock().unwrap().exit.clone();
        let Some(mut exit) = exit else {
            return true;
        };
        tokio::time::timeout(timeout, exit.wait_for(ExitState::is_exited))
            .await
            .is_ok()
    }
}

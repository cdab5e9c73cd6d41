//! Test-session owner of the job registry.
//!
//! A [`Session`] hands out environments and tears all of them down at the end
//! of the run, when the test binary is interrupted, or when it is dropped.

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use nix::sys::signal::{self as nix_signal, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::registry::JobRegistry;
use crate::settings::{SessionOptions, SessionSettings};
use crate::spawner::{ProcessSpawner, TokioSpawner};

pub struct Session {
    registry: JobRegistry,
    settings: Arc<SessionSettings>,
    spawner: Arc<dyn ProcessSpawner>,
    token: CancellationToken,
    last_signal: AtomicI32,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("jobs", &self.registry.len())
            .field("token", &self.token)
            .finish()
    }
}

impl Session {
    /// Session configured from `CLITEST_*` variables and defaults.
    pub fn new() -> Arc<Self> {
        Self::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Arc<Self> {
        Self::with_spawner(options, Arc::new(TokioSpawner::new()))
    }

    pub fn with_spawner(options: SessionOptions, spawner: Arc<dyn ProcessSpawner>) -> Arc<Self> {
        let settings = SessionSettings::resolve(options, SessionOptions::from_env());
        Arc::new(Self {
            registry: JobRegistry::new(settings.kill_timeout),
            settings: Arc::new(settings),
            spawner,
            token: CancellationToken::new(),
            last_signal: AtomicI32::new(0),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled when teardown begins.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Acquire a fresh environment with its own temporary directory.
    pub fn prepare_environment(&self) -> Result<Environment> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let job = self.registry.acquire(&self.settings)?;
        Ok(Environment::new(
            job,
            self.registry.clone(),
            self.spawner.clone(),
            self.settings.clone(),
        ))
    }

    pub async fn cleanup_all(&self) -> Result<()> {
        self.registry.cleanup_all().await
    }

    /// Refuse new environments, then clean up all existing ones.
    pub async fn teardown(&self) -> Result<()> {
        self.token.cancel();
        self.cleanup_all().await
    }

    /// Tear down on SIGINT, SIGTERM or SIGHUP, then exit with the signal.
    ///
    /// A second signal exits immediately.
    pub fn install_signals(self: &Arc<Self>) -> io::Result<()> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = sigint.recv() => Signal::SIGINT,
                    _ = sigterm.recv() => Signal::SIGTERM,
                    _ = sighup.recv() => Signal::SIGHUP,
                };

                let Some(session) = weak.upgrade() else {
                    exit_process(received);
                };

                if session.last_signal.swap(received as i32, Ordering::SeqCst) != 0 {
                    info!("Received second signal, forcing exit...");
                    exit_process(received);
                }

                info!("Received {:?}, cleaning up environments...", received);
                tokio::spawn(async move {
                    if let Err(e) = session.teardown().await {
                        warn!("Cleanup after {:?} failed: {}", received, e);
                    }
                    exit_process(received);
                });
            }
        });
        Ok(())
    }

    pub fn last_signal(&self) -> Option<Signal> {
        match self.last_signal.load(Ordering::SeqCst) {
            0 => None,
            i => Signal::try_from(i).ok(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let cleaned = self.registry.cleanup_all_blocking();
        if cleaned > 0 {
            warn!(
                cleaned,
                "Session dropped with live environments; cleaned them up without waiting"
            );
        }
    }
}

/// Restore the default handler for `signal` and re-raise it so the process
/// terminates with the conventional status.
fn exit_process(signal: Signal) -> ! {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: installs the default disposition, no handler code is involved.
    if let Err(e) = unsafe { nix_signal::sigaction(signal, &action) } {
        warn!("Failed to restore default handler for {:?}: {}", signal, e);
    }
    if let Err(e) = nix_signal::raise(signal) {
        warn!("Failed to re-raise {:?}: {}", signal, e);
    }

    std::process::exit(128 + signal as i32);
}

//! The caller-facing handle to one acquired environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::exec::{self, ExecResult, ExecuteOptions, Execution, SpawnOptions};
use crate::process::SpawnedProcess;
use crate::registry::{AcquiredJob, JobId, JobRegistry};
use crate::sandbox::Sandbox;
use crate::settings::SessionSettings;
use crate::slot::ProcessSlot;
use crate::spawner::ProcessSpawner;

#[derive(Clone)]
pub struct Environment {
    id: JobId,
    sandbox: Sandbox,
    registry: JobRegistry,
    spawner: Arc<dyn ProcessSpawner>,
    settings: Arc<SessionSettings>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("dir", &self.sandbox.root())
            .finish()
    }
}

impl Environment {
    pub(crate) fn new(
        job: AcquiredJob,
        registry: JobRegistry,
        spawner: Arc<dyn ProcessSpawner>,
        settings: Arc<SessionSettings>,
    ) -> Self {
        Self {
            id: job.id,
            sandbox: Sandbox::new(job.dir),
            registry,
            spawner,
            settings,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn dir(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    fn start(
        &self,
        runner: &str,
        command: &str,
        run_from: Option<PathBuf>,
        env: std::collections::BTreeMap<String, String>,
    ) -> Result<Execution> {
        let request = exec::build_request(runner, command, self.dir().to_path_buf(), run_from, env)?;
        let slot = ProcessSlot::empty();
        let index = self.registry.track(self.id, slot.clone())?;
        let execution = exec::launch(
            self.spawner.as_ref(),
            &request,
            slot,
            self.settings.drain_timeout,
        )?;

        // Cleanup may have run between tracking and launching.
        if self.registry.is_closed(self.id) {
            execution.slot.terminate();
        }
        if self.settings.debug {
            execution.mirror();
        }
        debug!(job = %self.id, slot = index, "tracking process");
        Ok(execution)
    }

    /// Run a command to completion, or until `options.timeout` elapses.
    ///
    /// The process gets a closed stdin.
    pub async fn execute(
        &self,
        runner: &str,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<ExecResult> {
        let execution = self.start(runner, command, options.run_from, options.env)?;
        execution.slot.close_stdin().await;
        Ok(execution.finish(options.timeout).await)
    }

    /// Start a command and return a handle to interact with it.
    pub async fn spawn(
        &self,
        runner: &str,
        command: &str,
        options: SpawnOptions,
    ) -> Result<SpawnedProcess> {
        let execution = self.start(runner, command, options.run_from, options.env)?;
        Ok(SpawnedProcess::new(
            self.id,
            execution,
            self.settings.wait_timeout,
        ))
    }

    /// Kill every process of this environment and remove its directory.
    pub async fn cleanup(&self) -> Result<()> {
        self.registry.cleanup(self.id).await
    }

    pub async fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        self.sandbox.write_file(path, contents).await
    }

    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        self.sandbox.read_file(path).await
    }

    pub async fn remove_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.sandbox.remove_file(path).await
    }

    pub async fn remove_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        self.sandbox.remove_dir(path).await
    }

    pub async fn ls(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        self.sandbox.ls(path).await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.sandbox.exists(path).await
    }

    pub async fn make_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        self.sandbox.make_dir(path).await
    }
}

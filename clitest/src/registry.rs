//! Registry of acquired test environments.
//!
//! Each [`Job`] owns a temporary directory and the process slots of every
//! execution started in it. Cleanup is idempotent: the first call kills the
//! live processes, waits for them to be reaped and removes the directory;
//! later calls (and calls for already-retired ids) succeed without doing
//! anything.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::settings::{DEFAULT_KILL_TIMEOUT, SessionSettings};
use crate::slot::ProcessSlot;

/// Opaque identifier of one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
struct Job {
    dir: PathBuf,
    cleanup_performed: bool,
    slots: Vec<ProcessSlot>,
}

#[derive(Debug, Default)]
struct RegistryState {
    jobs: HashMap<JobId, Job>,
    /// Ids of cleaned jobs, kept so that repeated cleanup succeeds. Grows by
    /// one entry per environment for the lifetime of the registry.
    retired: HashSet<JobId>,
}

/// A freshly acquired environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredJob {
    pub id: JobId,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
    kill_timeout: Duration,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_TIMEOUT)
    }
}

impl JobRegistry {
    /// `kill_timeout` bounds how long cleanup waits for killed processes.
    pub fn new(kill_timeout: Duration) -> Self {
        Self {
            state: Arc::default(),
            kill_timeout,
        }
    }

    /// Create a temporary directory and register a job owning it.
    pub fn acquire(&self, settings: &SessionSettings) -> Result<AcquiredJob> {
        let root = std::path::absolute(&settings.temp_root)
            .unwrap_or_else(|_| settings.temp_root.clone());
        let temp_dir_error = |source: io::Error| Error::TempDir {
            root: root.clone(),
            source,
        };

        std::fs::create_dir_all(&root).map_err(temp_dir_error)?;
        let dir = tempfile::Builder::new()
            .prefix(&settings.dir_prefix)
            .tempdir_in(&root)
            .map_err(temp_dir_error)?
            .keep();

        let id = JobId::new();
        self.state.lock().unwrap().jobs.insert(
            id,
            Job {
                dir: dir.clone(),
                cleanup_performed: false,
                slots: Vec::new(),
            },
        );
        info!(job = %id, dir = %dir.display(), "Acquired environment");

        Ok(AcquiredJob { id, dir })
    }

    /// Attach a process slot to a job and return its index.
    pub(crate) fn track(&self, id: JobId, slot: ProcessSlot) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&id)
            .filter(|job| !job.cleanup_performed)
            .ok_or(Error::JobNotFound(id))?;
        job.slots.push(slot);
        Ok(job.slots.len() - 1)
    }

    /// Whether cleanup of `id` has started or finished.
    pub(crate) fn is_closed(&self, id: JobId) -> bool {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&id)
            .is_none_or(|job| job.cleanup_performed)
    }

    /// Kill every process of the job and remove its directory.
    pub async fn cleanup(&self, id: JobId) -> Result<()> {
        let (dir, slots) = {
            let mut state = self.state.lock().unwrap();
            if state.retired.contains(&id) {
                return Ok(());
            }
            let job = state.jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
            if job.cleanup_performed {
                return Ok(());
            }
            job.cleanup_performed = true;
            (job.dir.clone(), job.slots.clone())
        };

        let killed: Vec<ProcessSlot> = slots.into_iter().filter(|slot| slot.terminate()).collect();
        if !killed.is_empty() {
            debug!(job = %id, count = killed.len(), "killed processes");
        }

        let kill_timeout = self.kill_timeout;
        let reaped = join_all(killed.iter().map(|slot| slot.wait_exited(kill_timeout))).await;
        let stuck = reaped.iter().filter(|reaped| !**reaped).count();
        if stuck > 0 {
            warn!(job = %id, stuck, "processes were not reaped within {:?}", kill_timeout);
        }

        let removed = match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Cleanup {
                path: dir.clone(),
                source,
            }),
        };

        self.retire(id);
        info!(job = %id, dir = %dir.display(), "Cleaned up environment");
        removed
    }

    /// Clean up every job registered at the time of the call.
    ///
    /// All jobs are attempted; the first error is returned.
    pub async fn cleanup_all(&self) -> Result<()> {
        let mut first_error = None;
        for id in self.job_ids() {
            if let Err(e) = self.cleanup(id).await {
                warn!(job = %id, "cleanup failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Synchronous best-effort cleanup for use outside of a runtime.
    ///
    /// Does not wait for killed processes. Returns the number of jobs cleaned.
    pub fn cleanup_all_blocking(&self) -> usize {
        let jobs: Vec<(JobId, Job)> = {
            let mut state = self.state.lock().unwrap();
            let jobs: Vec<_> = state.jobs.drain().collect();
            state.retired.extend(jobs.iter().map(|(id, _)| *id));
            jobs
        };

        let mut cleaned = 0;
        for (id, job) in jobs {
            if job.cleanup_performed {
                continue;
            }
            for slot in &job.slots {
                slot.terminate();
            }
            match std::fs::remove_dir_all(&job.dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(job = %id, "failed to remove {}: {}", job.dir.display(), e),
            }
            cleaned += 1;
        }
        cleaned
    }

    fn retire(&self, id: JobId) {
        let mut state = self.state.lock().unwrap();
        state.jobs.remove(&id);
        state.retired.insert(id);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.state.lock().unwrap().jobs.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn dir(&self, id: JobId) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&id)
            .map(|job| job.dir.clone())
    }

    #[cfg(test)]
    fn slot_count(&self, id: JobId) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&id)
            .map(|job| job.slots.len())
    }
}

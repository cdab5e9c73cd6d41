//! File operations relative to an environment directory.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

fn sandbox_error(path: PathBuf) -> impl FnOnce(io::Error) -> Error {
    move |source| Error::Sandbox { path, source }
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the sandbox root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Write `contents`, creating missing parent directories.
    pub async fn write_file(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(sandbox_error(parent.to_path_buf()))?;
        }
        fs::write(&path, contents).await.map_err(sandbox_error(path))
    }

    pub async fn read_file(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.path(relative);
        fs::read_to_string(&path).await.map_err(sandbox_error(path))
    }

    pub async fn remove_file(&self, relative: impl AsRef<Path>) -> Result<()> {
        let path = self.path(relative);
        fs::remove_file(&path).await.map_err(sandbox_error(path))
    }

    /// Remove a directory and everything below it.
    pub async fn remove_dir(&self, relative: impl AsRef<Path>) -> Result<()> {
        let path = self.path(relative);
        fs::remove_dir_all(&path).await.map_err(sandbox_error(path))
    }

    /// Names of the entries of a directory, sorted.
    pub async fn ls(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.path(relative);
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(sandbox_error(path.clone()))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(sandbox_error(path.clone()))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    pub async fn exists(&self, relative: impl AsRef<Path>) -> bool {
        fs::try_exists(self.path(relative)).await.unwrap_or(false)
    }

    /// Create a directory and its missing parents.
    pub async fn make_dir(&self, relative: impl AsRef<Path>) -> Result<()> {
        let path = self.path(relative);
        fs::create_dir_all(&path).await.map_err(sandbox_error(path))
    }
}

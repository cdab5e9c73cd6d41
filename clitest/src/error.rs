use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::registry::JobId;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("failed to create a temporary directory under {root}")]
    #[diagnostic(help("set CLITEST_TMPDIR to a writable directory"))]
    TempDir {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid command line: {0}")]
    InvalidCommand(String),

    #[error("failed to launch `{runner}`")]
    Launch {
        runner: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job {0} does not exist")]
    #[diagnostic(help("the environment was already cleaned up"))]
    JobNotFound(JobId),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to remove {path}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sandbox operation failed on {path}")]
    Sandbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session is shutting down")]
    SessionClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

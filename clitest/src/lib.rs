//! # clitest
//!
//! Drive interactive command-line programs from integration tests.
//!
//! A [`Session`] hands out [`Environment`]s, each with its own temporary
//! directory. Commands run in an environment either to completion
//! ([`Environment::execute`]) or interactively ([`Environment::spawn`]),
//! where the returned [`SpawnedProcess`] can wait for text, type and press
//! keys. Cleanup kills every process of an environment and removes its
//! directory.

mod assertions;
pub mod environment;
pub mod error;
pub mod exec;
pub mod keys;
mod log;
pub mod output;
pub mod process;
pub mod registry;
pub mod sandbox;
pub mod session;
pub mod settings;
mod slot;
pub mod spawner;
pub mod wait;

pub use environment::Environment;
pub use error::{Error, Result};
pub use exec::{ExecResult, ExecuteOptions, ExitState, SpawnOptions};
pub use keys::Key;
pub use log::{Level, init_test_tracing, init_tracing};
pub use nix::sys::signal::Signal;
pub use output::{Chunk, Output, Stream, SubscriptionId};
pub use process::SpawnedProcess;
pub use registry::{AcquiredJob, JobId, JobRegistry};
pub use sandbox::Sandbox;
pub use session::Session;
pub use settings::{SessionOptions, SessionSettings};
pub use spawner::{ProcessSpawner, SpawnRequest, SpawnedChild, TokioSpawner};
pub use wait::{TextWaitOutcome, WaitForTextOptions, WaitOutcomeKind};

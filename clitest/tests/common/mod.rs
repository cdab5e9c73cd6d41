//! Shared test utilities for clitest integration tests.

// Each test file compiles separately, so not all helpers are used in each binary
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clitest::{Environment, Session, SessionOptions};
use tempfile::TempDir;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of the fixture CLI built alongside the tests.
pub const FIXTURE: &str = env!("CARGO_BIN_EXE_clitest-fixture");

/// Test context owning a session whose environments live in a private temp dir.
pub struct TestContext {
    pub temp_dir: TempDir,
    pub session: Arc<Session>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Self {
        clitest::init_test_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let session = Session::with_options(SessionOptions {
            temp_root: Some(temp_dir.path().to_path_buf()),
            ..options
        });
        Self { temp_dir, session }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn environment(&self) -> Environment {
        self.session
            .prepare_environment()
            .expect("Failed to prepare environment")
    }
}

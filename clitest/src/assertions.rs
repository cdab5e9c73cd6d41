//! Panicking assertions for test code.

use crate::exec::ExecResult;
use crate::wait::{TextWaitOutcome, WaitOutcomeKind};

fn printed(code: Option<i32>) -> String {
    code.map_or_else(|| "null".to_string(), |code| code.to_string())
}

impl TextWaitOutcome {
    #[track_caller]
    pub fn assert_found(&self) {
        assert!(
            self.kind == WaitOutcomeKind::Found,
            "expected the following query: \"{}\" to have been found in the process output (outcome: {})",
            self.text,
            self.kind
        );
    }

    #[track_caller]
    pub fn assert_not_found(&self) {
        assert!(
            self.kind != WaitOutcomeKind::Found,
            "expected the following query: \"{}\" to not be found in the process output",
            self.text
        );
    }

    #[track_caller]
    pub fn assert_timed_out(&self) {
        assert!(
            self.kind == WaitOutcomeKind::TimedOut,
            "expected query process to have timed out while querying \"{}\" (outcome: {})",
            self.text,
            self.kind
        );
    }

    #[track_caller]
    pub fn assert_exited(&self) {
        assert!(
            self.kind == WaitOutcomeKind::ProcessExited,
            "expected process to have exited before the following query: \"{}\" could be found in the output (outcome: {})",
            self.text,
            self.kind
        );
    }
}

impl ExecResult {
    #[track_caller]
    pub fn assert_exit_code(&self, expected: i32) {
        assert!(
            self.exit_code == Some(expected),
            "Expected: {}\nReceived: {}\nstdout: {:?}\nstderr: {:?}",
            expected,
            printed(self.exit_code),
            self.stdout,
            self.stderr
        );
    }

    #[track_caller]
    pub fn assert_exit_code_null(&self) {
        assert!(
            self.exit_code.is_none(),
            "Expected: null\nReceived: {}",
            printed(self.exit_code)
        );
    }
}

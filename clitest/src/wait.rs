//! Waiting for text to show up in a process's output.
//!
//! A wait races up to three events: the text appearing in a chunk, the
//! process exiting, and a timer. A [`SettleOnce`] cell decides the winner; the
//! subscription and the timer are released when the call returns or when the
//! caller drops the future.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::error::{Error, Result};
use crate::exec::ExitState;
use crate::output::{Output, SubscriptionGuard, strip_ansi_codes};

#[derive(Debug, Clone)]
pub struct WaitForTextOptions {
    /// Defaults to the session's wait timeout.
    pub timeout: Option<Duration>,
    /// Keep waiting even after the process exited.
    pub ignore_exit: bool,
    /// Look at output recorded before the call.
    pub check_history: bool,
    /// Treat the target as a regular expression.
    pub use_regex: bool,
}

impl Default for WaitForTextOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            ignore_exit: false,
            check_history: true,
            use_regex: false,
        }
    }
}

impl WaitForTextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn ignore_exit(mut self, ignore_exit: bool) -> Self {
        self.ignore_exit = ignore_exit;
        self
    }

    pub fn check_history(mut self, check_history: bool) -> Self {
        self.check_history = check_history;
        self
    }

    pub fn use_regex(mut self, use_regex: bool) -> Self {
        self.use_regex = use_regex;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcomeKind {
    Found,
    TimedOut,
    ProcessExited,
}

impl fmt::Display for WaitOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitOutcomeKind::Found => write!(f, "found"),
            WaitOutcomeKind::TimedOut => write!(f, "timeout"),
            WaitOutcomeKind::ProcessExited => write!(f, "exit"),
        }
    }
}

/// How a text wait ended. `text` is the query that was searched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWaitOutcome {
    pub kind: WaitOutcomeKind,
    pub text: String,
}

impl TextWaitOutcome {
    pub fn is_found(&self) -> bool {
        self.kind == WaitOutcomeKind::Found
    }

    pub fn is_timed_out(&self) -> bool {
        self.kind == WaitOutcomeKind::TimedOut
    }

    pub fn is_exited(&self) -> bool {
        self.kind == WaitOutcomeKind::ProcessExited
    }
}

enum TextMatcher {
    Substring(String),
    Pattern(Regex),
}

impl TextMatcher {
    fn new(target: &str, use_regex: bool) -> Result<Self> {
        if !use_regex {
            return Ok(TextMatcher::Substring(target.to_string()));
        }
        Regex::new(target)
            .map(TextMatcher::Pattern)
            .map_err(|source| Error::InvalidPattern {
                pattern: target.to_string(),
                source,
            })
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            TextMatcher::Substring(needle) => text.contains(needle.as_str()),
            TextMatcher::Pattern(regex) => regex.is_match(text),
        }
    }

    /// Test a raw chunk as received and with escape codes removed.
    fn matches_chunk(&self, raw: &str) -> bool {
        self.matches(raw) || self.matches(&strip_ansi_codes(raw))
    }
}

/// A value that can be set at most once, from any racer.
struct SettleOnce<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> SettleOnce<T> {
    fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Returns `false` if another racer settled first.
    fn settle(&self, value: T) -> bool {
        match self.sender.lock().unwrap().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

pub(crate) async fn wait_for_text(
    output: &Arc<Output>,
    exit: &watch::Receiver<ExitState>,
    target: &str,
    options: &WaitForTextOptions,
    default_timeout: Duration,
) -> Result<TextWaitOutcome> {
    let matcher = Arc::new(TextMatcher::new(target, options.use_regex)?);
    let outcome = |kind| TextWaitOutcome {
        kind,
        text: target.to_string(),
    };

    let (cell, mut settled) = SettleOnce::new();
    let cell = Arc::new(cell);

    // Subscribe before looking at the history so no chunk slips in between.
    let _subscription = {
        let matcher = matcher.clone();
        let cell = cell.clone();
        let exit = exit.clone();
        let ignore_exit = options.ignore_exit;
        let id = output.subscribe(move |chunk| {
            if matcher.matches_chunk(&chunk.text) {
                cell.settle(WaitOutcomeKind::Found);
            } else if !ignore_exit && exit.borrow().is_exited() {
                cell.settle(WaitOutcomeKind::ProcessExited);
            }
        });
        SubscriptionGuard::new(output.clone(), id)
    };

    if options.check_history && matcher.matches(&output.searchable_text()) {
        return Ok(outcome(WaitOutcomeKind::Found));
    }
    if !options.ignore_exit && exit.borrow().is_exited() {
        return Ok(outcome(WaitOutcomeKind::ProcessExited));
    }

    let timeout = options.timeout.unwrap_or(default_timeout);
    let exited = {
        let mut exit = exit.clone();
        let ignore_exit = options.ignore_exit;
        async move {
            if ignore_exit || exit.wait_for(ExitState::is_exited).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };

    let raced = tokio::select! {
        biased;
        kind = &mut settled => Some(kind.unwrap_or(WaitOutcomeKind::TimedOut)),
        _ = exited => {
            cell.settle(WaitOutcomeKind::ProcessExited);
            None
        }
        _ = tokio::time::sleep(timeout) => {
            cell.settle(WaitOutcomeKind::TimedOut);
            None
        }
    };
    // A losing racer's settle is a no-op; the winner's value is already sent.
    let kind = match raced {
        Some(kind) => kind,
        None => settled.await.unwrap_or(WaitOutcomeKind::TimedOut),
    };

    debug!(query = target, %kind, "text wait settled");
    Ok(outcome(kind))
}

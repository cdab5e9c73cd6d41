//! Line history and live fan-out of subprocess output.
//!
//! Every chunk appended to an [`Output`] is split into lines and recorded in the
//! history of its stream before subscribers are notified, so a subscriber always
//! observes its chunk already reflected in [`Output::stdout`] / [`Output::stderr`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A raw piece of output as it was read from the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub stream: Stream,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Chunk) + Send + Sync>;

#[derive(Default)]
struct StreamHistory {
    lines: Vec<String>,
    /// Trailing fragment not yet terminated by a newline.
    residual: String,
}

impl StreamHistory {
    fn push_text(&mut self, text: &str) {
        self.residual.push_str(text);
        let Some(last_newline) = self.residual.rfind('\n') else {
            return;
        };
        let rest = self.residual.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.residual, rest);
        for line in complete.split('\n') {
            self.push_line(line);
        }
    }

    fn push_line(&mut self, raw: &str) {
        let cleaned = strip_ansi_codes(raw);
        let cleaned = cleaned.trim();
        if !cleaned.is_empty() {
            self.lines.push(cleaned.to_string());
        }
    }

    fn flush(&mut self) {
        let residual = std::mem::take(&mut self.residual);
        self.push_line(&residual);
    }
}

#[derive(Default)]
struct Inner {
    stdout: StreamHistory,
    stderr: StreamHistory,
    listeners: BTreeMap<SubscriptionId, Listener>,
    next_id: u64,
}

impl Inner {
    fn history_mut(&mut self, stream: Stream) -> &mut StreamHistory {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }
}

/// Output history of one execution plus its live subscribers.
#[derive(Default)]
pub struct Output {
    inner: Mutex<Inner>,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Output")
            .field("stdout", &inner.stdout.lines)
            .field("stderr", &inner.stderr.lines)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `text` in the history of `stream`, then notify subscribers.
    pub fn append(&self, stream: Stream, text: &str) {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.lock().unwrap();
            inner.history_mut(stream).push_text(text);
            inner.listeners.values().cloned().collect()
        };

        let chunk = Chunk {
            stream,
            text: text.to_string(),
        };
        for listener in listeners {
            listener(&chunk);
        }
    }

    /// Flush the pending partial line of `stream` into its history.
    ///
    /// Called once the underlying stream reached end of file.
    pub fn finish(&self, stream: Stream) {
        self.inner.lock().unwrap().history_mut(stream).flush();
    }

    /// Register a listener for chunks appended from now on.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Chunk) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::new(listener));
        id
    }

    /// Returns `false` if the subscription was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().unwrap().listeners.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.inner.lock().unwrap().stdout.lines.clone()
    }

    pub fn stderr(&self) -> Vec<String> {
        self.inner.lock().unwrap().stderr.lines.clone()
    }

    /// Everything recorded so far, including unterminated trailing lines.
    pub fn searchable_text(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(inner.stdout.lines.iter().map(String::as_str));
        parts.push(inner.stdout.residual.as_str());
        parts.extend(inner.stderr.lines.iter().map(String::as_str));
        parts.push(inner.stderr.residual.as_str());
        parts.join("\n")
    }
}

/// Removes `Drop`-scoped subscriptions.
pub(crate) struct SubscriptionGuard {
    output: Arc<Output>,
    id: SubscriptionId,
}

impl SubscriptionGuard {
    pub(crate) fn new(output: Arc<Output>, id: SubscriptionId) -> Self {
        Self { output, id }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.output.unsubscribe(self.id);
    }
}

/// Strip ANSI escape sequences and carriage returns.
pub fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7E
                Some('[') => {
                    chars.next();
                    while let Some(next) = chars.next() {
                        if ('\x40'..='\x7e').contains(&next) {
                            break;
                        }
                    }
                }
                // OSC: terminated by BEL or ESC \
                Some(']') => {
                    chars.next();
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            },
            '\r' => {}
            _ => result.push(c),
        }
    }

    result
}

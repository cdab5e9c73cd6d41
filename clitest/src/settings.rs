//! Session options and resolved settings.
//!
//! - `SessionOptions`: all `Option<T>` fields, filled by the caller or read from
//!   `CLITEST_*` environment variables
//! - `SessionSettings`: plain values used by the engine
//! - `SessionSettings::resolve()`: explicit options > environment > defaults

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const ENV_TMPDIR: &str = "CLITEST_TMPDIR";
pub const ENV_DIR_PREFIX: &str = "CLITEST_DIR_PREFIX";
pub const ENV_WAIT_TIMEOUT: &str = "CLITEST_WAIT_TIMEOUT";
pub const ENV_DRAIN_TIMEOUT: &str = "CLITEST_DRAIN_TIMEOUT";
pub const ENV_KILL_TIMEOUT: &str = "CLITEST_KILL_TIMEOUT";
pub const ENV_DEBUG: &str = "CLITEST_DEBUG";

pub const DEFAULT_DIR_PREFIX: &str = "clitest-";
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// Combine two values, preferring `self` (higher precedence).
pub(crate) trait Combine: Sized {
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        self.or(other)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Directory under which environment directories are created.
    pub temp_root: Option<PathBuf>,
    /// Prefix of each environment directory name.
    pub dir_prefix: Option<String>,
    /// Default timeout for `wait_for_text`.
    pub wait_timeout: Option<Duration>,
    /// How long to keep reading output after the process exited.
    pub drain_timeout: Option<Duration>,
    /// How long cleanup waits for a killed process to be reaped.
    pub kill_timeout: Option<Duration>,
    /// Mirror the output of every spawned process to the real terminal.
    pub debug: Option<bool>,
}

impl SessionOptions {
    /// Read options from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through an arbitrary lookup function.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let duration = |key: &str| {
            let raw = lookup(key)?;
            match humantime::parse_duration(raw.trim()) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("Ignoring {}={:?}: {}", key, raw, e);
                    None
                }
            }
        };

        let debug = lookup(ENV_DEBUG).and_then(|raw| match raw.trim() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            other => {
                warn!("Ignoring {}={:?}: expected a boolean", ENV_DEBUG, other);
                None
            }
        });

        Self {
            temp_root: lookup(ENV_TMPDIR)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            dir_prefix: lookup(ENV_DIR_PREFIX).filter(|s| !s.is_empty()),
            wait_timeout: duration(ENV_WAIT_TIMEOUT),
            drain_timeout: duration(ENV_DRAIN_TIMEOUT),
            kill_timeout: duration(ENV_KILL_TIMEOUT),
            debug,
        }
    }
}

/// Resolved session settings.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub temp_root: PathBuf,
    pub dir_prefix: String,
    pub wait_timeout: Duration,
    pub drain_timeout: Duration,
    pub kill_timeout: Duration,
    pub debug: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            dir_prefix: DEFAULT_DIR_PREFIX.to_string(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            debug: false,
        }
    }
}

impl SessionSettings {
    /// Resolve settings from explicit options and environment-derived options.
    ///
    /// Precedence: options > env > default.
    pub fn resolve(options: SessionOptions, env: SessionOptions) -> Self {
        let defaults = Self::default();
        Self {
            temp_root: options
                .temp_root
                .combine(env.temp_root)
                .unwrap_or(defaults.temp_root),
            dir_prefix: options
                .dir_prefix
                .combine(env.dir_prefix)
                .unwrap_or(defaults.dir_prefix),
            wait_timeout: options
                .wait_timeout
                .combine(env.wait_timeout)
                .unwrap_or(defaults.wait_timeout),
            drain_timeout: options
                .drain_timeout
                .combine(env.drain_timeout)
                .unwrap_or(defaults.drain_timeout),
            kill_timeout: options
                .kill_timeout
                .combine(env.kill_timeout)
                .unwrap_or(defaults.kill_timeout),
            debug: options.debug.combine(env.debug).unwrap_or(defaults.debug),
        }
    }
}

use std::io::{self, IsTerminal};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Default, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Silent,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Silent => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy()
}

/// Install a stderr subscriber. `RUST_LOG` overrides `level`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(level: Level) -> bool {
    let ansi = io::stderr().is_terminal();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(ansi)
                .with_target(true)
                .with_filter(env_filter(level)),
        )
        .try_init()
        .is_ok()
}

/// Install a subscriber whose output is captured by the test harness.
pub fn init_test_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_test_writer()
                .with_filter(env_filter(Level::Debug)),
        )
        .try_init()
        .is_ok()
}

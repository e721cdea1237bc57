//! Logging manager
//!
//! Provides dual-output logging:
//! - Console: INFO level with concise format
//! - File: one log file per run, configured level, with targets
//!
//! A [`CountingLayer`] sits next to both outputs and counts the warnings and
//! errors emitted by this crate. Per-alias results are deltas of that count.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::expand_tilde;

/// Events from targets outside this prefix are never counted
const COUNTED_TARGET: &str = "account_backup";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for log files
    pub log_directory: PathBuf,
    /// Log level for file output (console always uses INFO)
    pub log_level: Level,
    /// Maximum number of run logs to keep
    pub max_files: u32,
}

impl LoggingConfig {
    /// Create from `general` config values
    pub fn from_config(log_directory: &Path, log_level: &str, max_files: u32) -> Self {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        Self {
            log_directory: log_directory.to_path_buf(),
            log_level: level,
            max_files,
        }
    }
}

/// Warning and error counts of a run or part of it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    pub warnings: usize,
    pub errors: usize,
}

impl RunResult {
    pub fn new(warnings: usize, errors: usize) -> Self {
        Self { warnings, errors }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings == 0 && self.errors == 0
    }
}

impl Add for RunResult {
    type Output = RunResult;

    fn add(self, other: RunResult) -> RunResult {
        RunResult {
            warnings: self.warnings + other.warnings,
            errors: self.errors + other.errors,
        }
    }
}

impl AddAssign for RunResult {
    fn add_assign(&mut self, other: RunResult) {
        *self = *self + other;
    }
}

/// Shared warning/error counters fed by [`CountingLayer`]
#[derive(Debug, Clone, Default)]
pub struct LogCounter {
    warnings: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl LogCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer that feeds this counter
    pub fn layer(&self) -> CountingLayer {
        CountingLayer {
            counter: self.clone(),
        }
    }

    /// Totals so far
    pub fn snapshot(&self) -> RunResult {
        RunResult {
            warnings: self.warnings.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }

    /// Counts recorded since `start` was taken
    pub fn since(&self, start: RunResult) -> RunResult {
        let now = self.snapshot();
        RunResult {
            warnings: now.warnings.saturating_sub(start.warnings),
            errors: now.errors.saturating_sub(start.errors),
        }
    }
}

/// Counts WARN and ERROR events emitted by this crate
pub struct CountingLayer {
    counter: LogCounter,
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(COUNTED_TARGET) {
            return;
        }

        match *metadata.level() {
            Level::WARN => {
                self.counter.warnings.fetch_add(1, Ordering::SeqCst);
            }
            Level::ERROR => {
                self.counter.errors.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

/// Keeps track of the run's log file
pub struct LogGuard {
    log_file: PathBuf,
}

impl LogGuard {
    /// Log file of the current run
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

/// Initialize logging with console and file outputs
///
/// Every run writes its own `<YYYY-MM-DD-HHMMSS>.log`; older run logs beyond
/// `max_files` are removed.
pub fn init_logging(config: &LoggingConfig, counter: &LogCounter) -> Result<LogGuard> {
    let log_dir = expand_tilde(&config.log_directory);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let file_name = format!("{}.log", Local::now().format("%Y-%m-%d-%H%M%S"));
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &file_name);

    // File layer: configured level, detailed format
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_filter(level_filter(config.log_level));

    // Console layer: INFO level, concise format
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_filter(level_filter(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(counter.layer())
        .try_init()
        .context("Failed to install log subscriber")?;

    cleanup_old_logs(&log_dir, config.max_files)?;

    Ok(LogGuard {
        log_file: log_dir.join(file_name),
    })
}

/// Initialize simple console-only logging (for when config isn't available)
pub fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}

/// Create a level filter for tracing layers
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{}={}", COUNTED_TARGET, level)))
}

/// Cleanup old log files, keeping only the most recent N files
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".log"))
        .collect();

    // Newest first; names are timestamps so they break ties
    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time
            .cmp(&a_time)
            .then_with(|| b.file_name().cmp(&a.file_name()))
    });

    for file in log_files.into_iter().skip(max_files as usize) {
        if let Err(e) = fs::remove_file(file.path()) {
            tracing::warn!("Failed to remove old log file {:?}: {}", file.path(), e);
        } else {
            tracing::debug!("Removed old log file: {:?}", file.path());
        }
    }

    Ok(())
}

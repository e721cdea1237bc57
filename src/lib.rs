//! Account Backup Library
//!
//! This library backs up personal online accounts (GitHub, Gist, Google
//! Drive, Google Photos, Dropbox), databases and servers into local folders.

pub mod config;
pub mod managers;
pub mod strategies;
pub mod utils;

// Re-export commonly used types
pub use config::{AppPaths, JsonStore, StrategyKind};
pub use managers::backup::{BackupManager, BatchSummary};
pub use managers::logging::{
    init_console_logging, init_logging, LogCounter, LogGuard, LoggingConfig, RunResult,
};
pub use managers::notification::NotificationManager;
pub use managers::registration::RegistrationManager;
pub use strategies::{run_backup, Context, Strategy, StrategyError};

//! Test utilities for account-backup
//!
//! This crate provides shared test utilities, fake remote sources and
//! helper functions for testing the account-backup application.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{with_counter, ConfigBuilder, FakeRemote, TestContext, WalkingStrategy};
//!
//! #[test]
//! fn my_test() {
//!     let test = TestContext::new();
//!     let config = ConfigBuilder::new()
//!         .remote("drive", &test.backup_dir("drive"))
//!         .persist(test.paths());
//!     let mut ctx = test.context(config, MockExecutor::new());
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{entry_names, TestContext, STAMP};

// Re-export types from the main crate for convenience
pub use account_backup::config::{AppPaths, CacheEntry, GeneralConfig, JsonStore, StrategyKind};
pub use account_backup::managers::backup::{AliasReport, BackupManager, BatchSummary};
pub use account_backup::managers::logging::{LogCounter, RunResult};
pub use account_backup::strategies::{run_backup, Context, Strategy, StrategyError};

// Re-export mock implementations from the main crate
pub use account_backup::managers::registration::mock::ScriptedPrompter;
pub use account_backup::utils::executor::mock::{MockExecutor, MockResponse};
pub use account_backup::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;

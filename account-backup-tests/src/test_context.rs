//! Test context and harness
//!
//! Provides a temporary application home plus helpers to build a strategy
//! [`Context`] on top of it.

use account_backup::config::{AppPaths, JsonStore};
use account_backup::managers::logging::LogCounter;
use account_backup::strategies::Context;
use account_backup::utils::executor::mock::MockExecutor;
use account_backup::utils::{CommandExecutor, Interrupt};
use anyhow::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Run marker used by every context built here
pub const STAMP: &str = "2024-01-01_000000";

/// Temporary application home
pub struct TestContext {
    temp_dir: TempDir,
    paths: AppPaths,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let paths = AppPaths::new(temp_dir.path());
        Self { temp_dir, paths }
    }

    pub fn home(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Backup destination for `alias`, not created
    pub fn backup_dir(&self, alias: &str) -> PathBuf {
        self.temp_dir.path().join("backups").join(alias)
    }

    /// Strategy context over `config`, stamped with [`STAMP`]
    pub fn context(&self, config: JsonStore, executor: MockExecutor) -> Context {
        Context::new(
            config,
            self.paths.clone(),
            Arc::new(executor),
            LogCounter::new(),
            Interrupt::new(),
        )
        .with_stamp(STAMP)
    }

    /// Context around any executor, sharing `interrupt` with it
    pub fn context_with(
        &self,
        config: JsonStore,
        executor: Arc<dyn CommandExecutor>,
        interrupt: Interrupt,
    ) -> Context {
        Context::new(config, self.paths.clone(), executor, LogCounter::new(), interrupt)
            .with_stamp(STAMP)
    }

    /// Reopen the sync cache of `alias` from disk
    pub fn cache(&self, alias: &str) -> JsonStore {
        JsonStore::open(self.paths.cache_file(alias)).expect("Failed to open cache")
    }

    /// Create a file below the home, with parents
    pub fn create_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create a directory with a modification time `age_secs` in the past
    pub fn create_aged_dir(&self, path: &Path, age_secs: u64) -> PathBuf {
        std::fs::create_dir_all(path).expect("Failed to create directory");
        File::open(path)
            .and_then(|dir| dir.set_modified(SystemTime::now() - Duration::from_secs(age_secs)))
            .expect("Failed to set modification time");
        path.to_path_buf()
    }

    pub fn read_file(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted names of the entries directly below `dir`
pub fn entry_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

//! Configuration module for account-backup
//!
//! This module owns the on-disk layout of the application home and the
//! stores living in it.
//!
//! ## Layout
//!
//! ```text
//! <home>/
//!   config/config.json   alias namespaces plus the reserved `general` one
//!   cache/<alias>.json   per-alias sync state
//!   log/                 one log file per run
//!   tmp/                 run-scoped staging, removed after every batch
//!   backups/<alias>      default backup destination offered by `add`
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use account_backup::config::{AppPaths, JsonStore};
//!
//! let paths = AppPaths::new("~/.local/share/account-backup");
//! let store = JsonStore::open(paths.config_file())?;
//!
//! for alias in store.keys() {
//!     println!("Alias: {}", alias);
//! }
//! # Ok::<(), account_backup::config::StoreError>(())
//! ```

mod schema;
mod store;
mod types;

pub use schema::{Field, FieldType, Schema, SchemaError, COMMON_FIELDS};
pub use store::{JsonStore, StoreError};
pub use types::*;

use std::path::{Path, PathBuf};

/// Environment variable overriding the application home
pub const HOME_ENV: &str = "ACCOUNT_BACKUP_HOME";

/// Locations under the application home
#[derive(Debug, Clone)]
pub struct AppPaths {
    home: PathBuf,
}

impl AppPaths {
    pub fn new<P: AsRef<Path>>(home: P) -> Self {
        Self {
            home: expand_tilde(home.as_ref()),
        }
    }

    /// `dirs::data_dir()/account-backup`, falling back to the working directory
    pub fn default_home() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("account-backup")
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config").join("config.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Cache store of one alias
    pub fn cache_file(&self, alias: &str) -> PathBuf {
        self.cache_dir().join(format!("{}.json", alias))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join("log")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.home.join("tmp")
    }

    /// Default backup destination for a new alias
    pub fn default_backup_path(&self, alias: &str) -> PathBuf {
        self.home.join("backups").join(alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AliasNameError {
    #[error("Alias must not be empty")]
    Empty,
    #[error("Alias must not contain '.'")]
    ContainsDot,
    #[error("'{0}' is reserved")]
    Reserved(String),
}

/// Check a new alias name against the store's key rules
pub fn validate_alias_name(alias: &str) -> Result<(), AliasNameError> {
    if alias.trim().is_empty() {
        return Err(AliasNameError::Empty);
    }
    if alias.contains('.') {
        return Err(AliasNameError::ContainsDot);
    }
    if alias == GENERAL_NAMESPACE {
        return Err(AliasNameError::Reserved(alias.to_string()));
    }
    Ok(())
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

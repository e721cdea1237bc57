//! Backup strategies
//!
//! Every strategy goes through the same lifecycle, driven by [`run_backup`]:
//!
//! 1. Resolve the alias namespace in the config store
//! 2. Validate the schema's required fields plus `backup_path` and `type`
//! 3. Compute the effective destination (`<backup_path>/<alias>_<stamp>` for
//!    versioned or multipart runs) and create it
//! 4. Run the strategy-specific transfer
//! 5. Teardown: prune old generations unless this is a multipart sub-step
//!
//! Failures are logged and turned into warning/error counts at the alias
//! boundary; only [`StrategyError::is_fatal`] kinds unwind to the caller.

pub mod database;
pub mod dropbox;
pub mod gist;
pub mod github;
pub mod google;
pub mod googledrive;
pub mod googlephotos;
pub mod server;
pub mod walker;
pub mod wordpress;

use chrono::Local;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use crate::config::{
    expand_tilde, AliasConfig, AppPaths, JsonStore, Schema, SchemaError, StoreError,
    StrategyKind, UnknownKind,
};
use crate::managers::registration::Prompter;
use crate::utils::executor::CommandExecutor;
use crate::utils::oauth::OAuthError;
use crate::utils::{fs, retention, Interrupt, Interrupted};

pub use crate::managers::logging::{LogCounter, RunResult};

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("Alias {0} does not exist")]
    AliasNotFound(String),

    #[error("Config corrupted: \"{0}\" is missing")]
    MissingField(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    UnknownType(#[from] UnknownKind),

    #[error("Cannot create backup directory {path:?}: {source}")]
    BackupPath { path: PathBuf, source: io::Error },

    #[error("Interrupted")]
    Interrupted,

    #[error("{0} is not installed")]
    MissingProgram(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StrategyError {
    /// Fatal kinds unwind past the alias boundary
    pub fn is_fatal(&self) -> bool {
        matches!(self, StrategyError::BackupPath { .. })
    }

    /// Log at the level matching the kind
    pub fn report(&self) {
        match self {
            StrategyError::Interrupted => warn!("Interrupted"),
            StrategyError::Other(e) => error!("{:#}", e),
            other => error!("{}", other),
        }
    }
}

impl From<Interrupted> for StrategyError {
    fn from(_: Interrupted) -> Self {
        StrategyError::Interrupted
    }
}

/// Everything a strategy needs from the running process
pub struct Context {
    pub config: JsonStore,
    pub paths: AppPaths,
    pub executor: Arc<dyn CommandExecutor>,
    pub counter: LogCounter,
    pub interrupt: Interrupt,
    /// Run marker, `%Y-%m-%d_%H%M%S` at startup
    pub stamp: String,
}

impl Context {
    pub fn new(
        config: JsonStore,
        paths: AppPaths,
        executor: Arc<dyn CommandExecutor>,
        counter: LogCounter,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            config,
            paths,
            executor,
            counter,
            interrupt,
            stamp: Local::now().format("%Y-%m-%d_%H%M%S").to_string(),
        }
    }

    /// Replace the run marker
    pub fn with_stamp(mut self, stamp: &str) -> Self {
        self.stamp = stamp.to_string();
        self
    }

    /// Open the sync cache of `alias`
    pub fn cache_store(&self, alias: &str) -> Result<JsonStore, StoreError> {
        JsonStore::open(self.paths.cache_file(alias))
    }

    /// Fresh run-scoped staging folder
    pub fn tmp_folder(&self) -> io::Result<PathBuf> {
        fs::create_folder(&self.paths.tmp_dir())?;
        fs::create_tmp_folder(&self.paths.tmp_dir())
    }

    /// Fail with [`StrategyError::MissingProgram`] unless `program` is on `PATH`
    pub fn require_program(&self, program: &str) -> Result<(), StrategyError> {
        if self.executor.program_available(program) {
            Ok(())
        } else {
            Err(StrategyError::MissingProgram(program.to_string()))
        }
    }
}

/// One resolved alias run
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub alias: String,
    pub config: AliasConfig,
    /// The whole alias namespace
    pub settings: Map<String, Value>,
    /// Effective destination of this run
    pub backup_path: PathBuf,
    pub multipart: bool,
    pub stamp: String,
}

impl BackupJob {
    /// Deserialize the namespace into a strategy's settings struct
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, StrategyError> {
        serde_json::from_value(Value::Object(self.settings.clone()))
            .map_err(|e| StrategyError::InvalidConfig(format!("{}: {}", self.alias, e)))
    }

    /// `<alias>_<stamp>`, the name of this run's artifacts
    pub fn artifact_name(&self) -> String {
        format!("{}_{}", self.alias, self.stamp)
    }

    /// Base backup directory, without generation suffix
    pub fn base_path(&self) -> &Path {
        &self.config.backup_path
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout_seconds.map(Duration::from_secs)
    }

    /// Whether this run writes into its own generation directory
    pub fn is_generation(&self) -> bool {
        self.backup_path != self.config.backup_path
    }
}

/// A backup strategy for one remote-system type
pub trait Strategy {
    fn kind(&self) -> StrategyKind;

    /// Values applied by the add flow instead of prompting
    fn overrides(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Extra add-flow steps after the schema prompts (OAuth consent, ...)
    fn configure(
        &mut self,
        _alias: &str,
        _settings: &mut Map<String, Value>,
        _prompter: &mut dyn Prompter,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// The strategy-specific transfer
    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError>;
}

/// Instantiate the strategy registered for `kind`
pub fn build_strategy(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Github => Box::new(github::GithubStrategy::new()),
        StrategyKind::Gist => Box::new(gist::GistStrategy::new()),
        StrategyKind::GooglePhotos => Box::new(googlephotos::GooglePhotosStrategy::new()),
        StrategyKind::GoogleDrive => Box::new(googledrive::GoogleDriveStrategy::new()),
        StrategyKind::Wordpress => Box::new(wordpress::WordpressStrategy::new()),
        StrategyKind::Dropbox => Box::new(dropbox::DropboxStrategy::new()),
        StrategyKind::Mysql => Box::new(database::DatabaseStrategy::mysql()),
        StrategyKind::Server => Box::new(server::ServerStrategy::new()),
        StrategyKind::Mongodb => Box::new(database::DatabaseStrategy::mongodb()),
        StrategyKind::Postgresql => Box::new(database::DatabaseStrategy::postgresql()),
    }
}

/// Run the full lifecycle of `strategy` for `alias`
///
/// Returns the warnings and errors logged during the run. Only fatal errors
/// are returned as `Err`.
pub fn run_backup(
    strategy: &mut dyn Strategy,
    ctx: &mut Context,
    alias: &str,
    multipart: bool,
) -> Result<RunResult, StrategyError> {
    let span = info_span!("backup", alias = %alias);
    let _enter = span.enter();
    let start = ctx.counter.snapshot();

    if !multipart {
        info!("Starting...");
    }

    let job = match prepare(strategy, ctx, alias, multipart) {
        Ok(job) => job,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            e.report();
            return Ok(ctx.counter.since(start));
        }
    };

    if let Err(e) = strategy.start_backup(ctx, &job) {
        if e.is_fatal() {
            return Err(e);
        }
        // Children get the same Ctrl+C and fail with their own error
        if ctx.interrupt.is_set() {
            debug!("Failed after interrupt: {}", e);
            StrategyError::Interrupted.report();
        } else {
            e.report();
        }
    }

    teardown(ctx, &job, start);

    Ok(ctx.counter.since(start))
}

fn prepare(
    strategy: &dyn Strategy,
    ctx: &Context,
    alias: &str,
    multipart: bool,
) -> Result<BackupJob, StrategyError> {
    let settings = ctx
        .config
        .get_in(&[alias])
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| StrategyError::AliasNotFound(alias.to_string()))?;

    let schema = Schema::for_kind(strategy.kind())?;
    if let Some(field) = schema.first_missing(&settings) {
        return Err(StrategyError::MissingField(field));
    }

    let mut config: AliasConfig = serde_json::from_value(Value::Object(settings.clone()))
        .map_err(|e| StrategyError::InvalidConfig(format!("{}: {}", alias, e)))?;
    config.backup_path = expand_tilde(&config.backup_path);

    let backup_path = if multipart || config.is_versioned() {
        config.backup_path.join(format!("{}_{}", alias, ctx.stamp))
    } else {
        config.backup_path.clone()
    };

    fs::create_folder(&backup_path).map_err(|source| StrategyError::BackupPath {
        path: backup_path.clone(),
        source,
    })?;

    Ok(BackupJob {
        alias: alias.to_string(),
        config,
        settings,
        backup_path,
        multipart,
        stamp: ctx.stamp.clone(),
    })
}

fn teardown(ctx: &Context, job: &BackupJob, start: RunResult) {
    if job.multipart {
        return;
    }

    // A failed run must not displace a good generation
    let failed = ctx.counter.since(start).errors > 0 || ctx.interrupt.is_set();
    if job.is_generation() && failed && fs::is_empty_dir(&job.backup_path)
    {
        match fs::remove_path(&job.backup_path) {
            Ok(()) => debug!("Removed empty generation {:?}", job.backup_path),
            Err(e) => warn!("Failed to remove empty generation {:?}: {}", job.backup_path, e),
        }
    }

    if let Some(versions) = job.config.versions.filter(|v| *v > 0) {
        if let Err(e) = retention::prune(job.base_path(), versions as usize, &job.alias) {
            error!("Failed to remove old versions: {}", e);
        }
    }

    info!("Done");
}

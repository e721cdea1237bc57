//! Backup manager - drives a batch of aliases end-to-end

use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

use crate::config::{StrategyKind, GENERAL_NAMESPACE};
use crate::managers::logging::RunResult;
use crate::managers::notification::NotificationManager;
use crate::strategies::{build_strategy, run_backup, Context, Strategy, StrategyError};
use crate::utils::fs::remove_path;

/// Outcome of one alias in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasReport {
    pub alias: String,
    pub result: RunResult,
    pub elapsed_secs: u64,
    pub notify_always: bool,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Everything counted during the batch, including cleanup
    pub total: RunResult,
    pub reports: Vec<AliasReport>,
    /// Whether the batch stopped early on an interrupt
    pub interrupted: bool,
}

pub struct BackupManager {
    ctx: Context,
    notifier: Option<NotificationManager>,
    log_file: Option<PathBuf>,
}

impl BackupManager {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            notifier: None,
            log_file: None,
        }
    }

    pub fn with_notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Log file attached to the report
    pub fn with_log_file(mut self, log_file: PathBuf) -> Self {
        self.log_file = Some(log_file);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Every configured alias except the `general` namespace
    pub fn aliases(&self) -> Vec<String> {
        self.ctx
            .config
            .keys()
            .into_iter()
            .filter(|key| key != GENERAL_NAMESPACE)
            .collect()
    }

    /// Run `aliases`, or every configured alias when empty
    pub fn run(&mut self, aliases: &[String]) -> BatchSummary {
        let aliases = if aliases.is_empty() {
            self.aliases()
        } else {
            aliases.to_vec()
        };

        let start = self.ctx.counter.snapshot();
        let mut summary = BatchSummary::default();

        if aliases.is_empty() {
            warn!("No aliases to back up");
        } else {
            info!("Backing up {} alias(es)", aliases.len());
        }

        for alias in &aliases {
            if self.ctx.interrupt.is_set() {
                warn!("Interrupted, skipping remaining aliases");
                summary.interrupted = true;
                break;
            }
            summary.reports.push(self.backup_alias(alias));
        }

        self.cleanup();

        summary.total = self.ctx.counter.since(start);
        info!(
            "Batch finished: {} warning(s), {} error(s)",
            summary.total.warnings, summary.total.errors
        );

        if let Some(notifier) = &self.notifier {
            notifier.notify(&summary, self.log_file.clone());
        }

        summary
    }

    /// Run one alias; configuration and fatal errors are logged, never returned
    pub fn backup_alias(&mut self, alias: &str) -> AliasReport {
        let started = Instant::now();
        let start = self.ctx.counter.snapshot();

        match self.resolve(alias) {
            Ok(mut strategy) => {
                if let Err(e) = run_backup(strategy.as_mut(), &mut self.ctx, alias, false) {
                    let span = info_span!("backup", alias = %alias);
                    let _enter = span.enter();
                    error!("Aborted: {}", e);
                }
            }
            Err(e) => {
                let span = info_span!("backup", alias = %alias);
                let _enter = span.enter();
                e.report();
            }
        }

        AliasReport {
            alias: alias.to_string(),
            result: self.ctx.counter.since(start),
            elapsed_secs: started.elapsed().as_secs(),
            notify_always: self.notify_always(alias),
        }
    }

    fn resolve(&self, alias: &str) -> Result<Box<dyn Strategy>, StrategyError> {
        let namespace = self
            .ctx
            .config
            .get_in(&[alias])
            .and_then(Value::as_object)
            .ok_or_else(|| StrategyError::AliasNotFound(alias.to_string()))?;

        let tag = namespace
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| StrategyError::MissingField("type".to_string()))?;

        Ok(build_strategy(StrategyKind::from_str(tag)?))
    }

    fn notify_always(&self, alias: &str) -> bool {
        self.ctx
            .config
            .get_in(&[alias, "notify_always"])
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    // Staging space never outlives a batch
    fn cleanup(&self) {
        let tmp = self.ctx.paths.tmp_dir();
        if let Err(e) = remove_path(&tmp) {
            warn!("Failed to remove temporary folder {:?}: {}", tmp, e);
        }
    }
}

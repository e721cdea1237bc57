//! WordPress backup
//!
//! Composite of the MySQL and server strategies over one alias namespace.
//! Both run as multipart sub-steps, so their artifacts land in the same
//! `<alias>_<stamp>` generation and neither prunes. Retention is owned by the
//! outermost, non-multipart run of this strategy.

use serde_json::{Map, Value};
use tracing::info;

use super::database::DatabaseStrategy;
use super::server::ServerStrategy;
use super::{run_backup, BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;

pub struct WordpressStrategy {
    database: DatabaseStrategy,
    files: ServerStrategy,
}

impl WordpressStrategy {
    pub fn new() -> Self {
        Self {
            database: DatabaseStrategy::mysql(),
            files: ServerStrategy::new(),
        }
    }
}

impl Strategy for WordpressStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Wordpress
    }

    fn overrides(&self) -> Map<String, Value> {
        let mut overrides = Map::new();
        overrides.insert("archive".to_string(), Value::Bool(true));
        overrides
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        info!("Backing up database");
        run_backup(&mut self.database, ctx, &job.alias, true)?;

        ctx.interrupt.check()?;

        info!("Backing up files");
        run_backup(&mut self.files, ctx, &job.alias, true)?;
        Ok(())
    }
}

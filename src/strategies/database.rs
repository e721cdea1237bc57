//! Database dump strategies
//!
//! MySQL, PostgreSQL and MongoDB are dumped from the local machine with the
//! vendor tools into `<alias>_<stamp>.<ext>` below the run's backup path.
//! Credentials are shell-quoted; a failed dump leaves no partial artifact.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::utils::command::quote;
use crate::utils::fs::remove_path;

/// Connection settings shared by all database aliases
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub db_host: String,
    #[serde(deserialize_with = "port")]
    pub db_port: u16,
    pub db_name: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub db_user: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub db_pass: Option<String>,
}

// Ports may be stored as numbers or strings
fn port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid port {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid port '{}'", s))),
        other => Err(D::Error::custom(format!("invalid port {}", other))),
    }
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Mysql,
    Postgresql,
    Mongodb,
}

impl Engine {
    pub fn program(&self) -> &'static str {
        match self {
            Engine::Mysql => "mysqldump",
            Engine::Postgresql => "pg_dump",
            Engine::Mongodb => "mongodump",
        }
    }

    /// Artifact file name for a run, a directory for MongoDB
    pub fn artifact(&self, name: &str) -> String {
        match self {
            Engine::Mysql => format!("{}.sql", name),
            Engine::Postgresql => format!("{}.dump", name),
            Engine::Mongodb => name.to_string(),
        }
    }

    /// Shell command line writing the dump to `output`
    pub fn command(&self, settings: &DatabaseSettings, output: &Path) -> anyhow::Result<String> {
        let output = quote(&output.to_string_lossy())?;
        let host = quote(&settings.db_host)?;
        let name = quote(&settings.db_name)?;
        let user = quote(settings.db_user.as_deref().unwrap_or_default())?;
        let pass = quote(settings.db_pass.as_deref().unwrap_or_default())?;

        Ok(match self {
            Engine::Mysql => format!(
                "mysqldump --column-statistics=0 --add-drop-table -h {} -P {} -u {} -p{} --result-file={} {}",
                host, settings.db_port, user, pass, output, name
            ),
            Engine::Postgresql => format!(
                "PGPASSWORD={} pg_dump -Fc -h {} -p {} -U {} -d {} -f {}",
                pass, host, settings.db_port, user, name, output
            ),
            Engine::Mongodb => {
                let mut command = format!(
                    "mongodump --forceTableScan -h {} --port {} --db {} --gzip --out {}",
                    host, settings.db_port, name, output
                );
                if settings.db_user.is_some() && settings.db_pass.is_some() {
                    command.push_str(&format!(
                        " --username {} --password {} --authenticationDatabase admin",
                        user, pass
                    ));
                }
                command
            }
        })
    }
}

pub struct DatabaseStrategy {
    engine: Engine,
}

impl DatabaseStrategy {
    pub fn mysql() -> Self {
        Self {
            engine: Engine::Mysql,
        }
    }

    pub fn postgresql() -> Self {
        Self {
            engine: Engine::Postgresql,
        }
    }

    pub fn mongodb() -> Self {
        Self {
            engine: Engine::Mongodb,
        }
    }

    fn artifact_path(&self, job: &BackupJob) -> PathBuf {
        job.backup_path.join(self.engine.artifact(&job.artifact_name()))
    }
}

impl Strategy for DatabaseStrategy {
    fn kind(&self) -> StrategyKind {
        match self.engine {
            Engine::Mysql => StrategyKind::Mysql,
            Engine::Postgresql => StrategyKind::Postgresql,
            Engine::Mongodb => StrategyKind::Mongodb,
        }
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        let settings: DatabaseSettings = job.settings()?;
        ctx.require_program(self.engine.program())?;

        let artifact = self.artifact_path(job);
        let command = self.engine.command(&settings, &artifact)?;

        info!("Dumping {} from {}", settings.db_name, settings.db_host);
        ctx.interrupt.check()?;

        if let Err(e) = ctx.executor.run_shell_command(&command, None, job.timeout()) {
            remove_path(&artifact)?;
            return Err(e.context(format!("Error downloading {}", settings.db_name)).into());
        }

        info!("Dumped into {:?}", artifact);
        Ok(())
    }
}

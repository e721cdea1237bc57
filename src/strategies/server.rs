//! Remote server backup over SSH
//!
//! Three modes, chosen by the alias' `archive` and `remote_zip` flags:
//!
//! - live mirror: `rsync -a` straight into the backup path
//! - remote zip: zip on the server, pull the archive with
//!   `rsync --remove-source-files`
//! - local zip: mirror into a staging folder and zip it locally
//!
//! Exclusions are rsync rules (or `zip -x` patterns for remote zips).

use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::utils::command::quote;
use crate::utils::fs::{remove_path, zip_dir};

const SSH_OPTIONS: &str = "ssh -o StrictHostKeyChecking=no";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub ssh_host: String,
    pub ssh_user: String,
    pub ssh_pass: String,
    pub path: String,
    #[serde(default)]
    pub remote_zip: bool,
}

impl ServerSettings {
    fn remote_path(&self) -> &str {
        self.path.trim_end_matches('/')
    }

    fn login(&self) -> String {
        format!("{}@{}", self.ssh_user, self.ssh_host)
    }

    fn sshpass(&self) -> anyhow::Result<String> {
        Ok(format!("sshpass -p {}", quote(&self.ssh_pass)?))
    }

    /// `rsync -a` of the remote directory into `dest`
    pub fn mirror_command(&self, exclude: &[String], dest: &Path) -> anyhow::Result<String> {
        let mut command = format!("{} rsync -a", self.sshpass()?);
        for rule in exclude {
            command.push_str(&format!(" --exclude {}", quote(rule)?));
        }
        command.push_str(&format!(
            " -e {} {} {}",
            quote(SSH_OPTIONS)?,
            quote(&format!("{}:{}/", self.login(), self.remote_path()))?,
            quote(&format!("{}/", dest.to_string_lossy()))?
        ));
        Ok(command)
    }

    /// Zip the remote directory into `<path>/<name>.zip` on the server
    pub fn remote_zip_command(&self, exclude: &[String], name: &str) -> anyhow::Result<String> {
        let path = self.remote_path();
        let (parent, basename) = match path.rsplit_once('/') {
            Some(("", base)) => ("/", base),
            Some((parent, base)) => (parent, base),
            None => (".", path),
        };

        let mut remote = format!(
            "cd {} && zip -r {} {}",
            quote(parent)?,
            quote(&format!("{}/{}.zip", path, name))?,
            quote(basename)?
        );
        for rule in exclude {
            let pattern = if rule.ends_with('/') {
                format!("{}/{}*", basename, rule)
            } else {
                format!("{}/{}", basename, rule)
            };
            remote.push_str(&format!(" -x {}", quote(&pattern)?));
        }

        Ok(format!(
            "{} ssh -o StrictHostKeyChecking=no {} {}",
            self.sshpass()?,
            quote(&self.login())?,
            quote(&remote)?
        ))
    }

    /// Pull `<path>/<name>.zip` into `dest`, removing it from the server
    pub fn pull_command(&self, name: &str, dest: &Path) -> anyhow::Result<String> {
        Ok(format!(
            "{} rsync --remove-source-files -a -e {} {} {}",
            self.sshpass()?,
            quote(SSH_OPTIONS)?,
            quote(&format!("{}:{}/{}.zip", self.login(), self.remote_path(), name))?,
            quote(&format!("{}/", dest.to_string_lossy()))?
        ))
    }
}

pub struct ServerStrategy;

impl ServerStrategy {
    pub fn new() -> Self {
        Self
    }

    fn run(ctx: &Context, job: &BackupJob, command: &str) -> Result<(), StrategyError> {
        ctx.interrupt.check()?;
        ctx.executor.run_shell_command(command, None, job.timeout())?;
        Ok(())
    }

    fn archive_locally(
        ctx: &Context,
        job: &BackupJob,
        settings: &ServerSettings,
    ) -> Result<(), StrategyError> {
        let staging = ctx.tmp_folder()?;
        let archive = job.backup_path.join(format!("{}.zip", job.artifact_name()));

        let result = Self::run(
            ctx,
            job,
            &settings.mirror_command(&job.config.exclude, &staging)?,
        )
        .and_then(|_| Ok(zip_dir(&staging, &archive)?));

        if let Err(e) = remove_path(&staging) {
            warn!("Failed to remove staging folder {:?}: {}", staging, e);
        }
        if result.is_err() {
            remove_path(&archive)?;
        }
        result
    }
}

impl Strategy for ServerStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Server
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        let settings: ServerSettings = job.settings()?;
        ctx.require_program("sshpass")?;
        ctx.require_program("rsync")?;

        info!("Pulling {} from {}", settings.path, settings.ssh_host);

        if !job.config.archive {
            let command = settings.mirror_command(&job.config.exclude, &job.backup_path)?;
            return Self::run(ctx, job, &command);
        }

        if settings.remote_zip {
            let name = job.artifact_name();
            Self::run(ctx, job, &settings.remote_zip_command(&job.config.exclude, &name)?)?;
            return Self::run(ctx, job, &settings.pull_command(&name, &job.backup_path)?);
        }

        Self::archive_locally(ctx, job, &settings)
    }
}

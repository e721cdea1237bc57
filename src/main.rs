use account_backup::config::{AppPaths, GeneralConfig, JsonStore, GENERAL_NAMESPACE, HOME_ENV};
use account_backup::managers::backup::BackupManager;
use account_backup::managers::logging::{self, LogCounter, LoggingConfig};
use account_backup::managers::notification::NotificationManager;
use account_backup::managers::registration::{DialoguerPrompter, RegistrationManager};
use account_backup::strategies::Context;
use account_backup::utils::{Interrupt, RealExecutor};
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "account-backup")]
#[command(about = "Back up online accounts, databases and servers into local folders", long_about = None)]
#[command(version)]
struct Cli {
    /// Application home (config, cache, logs)
    #[arg(long, global = true, env = HOME_ENV)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new alias interactively
    Add,

    /// Back up the given aliases, or every configured alias
    Backup {
        /// Aliases to back up (defaults to all)
        aliases: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::new(cli.home.unwrap_or_else(AppPaths::default_home));
    let config = JsonStore::open(paths.config_file())
        .with_context(|| format!("Failed to open config at {:?}", paths.config_file()))?;

    match cli.command {
        Commands::Add => {
            logging::init_console_logging();
            handle_add(config, &paths)
        }
        Commands::Backup { aliases } => {
            let errors = handle_backup(config, paths, &aliases)?;
            if errors > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn handle_add(mut config: JsonStore, paths: &AppPaths) -> Result<()> {
    let mut prompter = DialoguerPrompter;
    let mut manager = RegistrationManager::new(&mut config, paths);

    let alias = manager.add(&mut prompter)?;
    manager.configure_mail(&mut prompter)?;

    println!("✓ Added {}", alias);
    Ok(())
}

/// Run the batch; returns the number of errors
fn handle_backup(config: JsonStore, paths: AppPaths, aliases: &[String]) -> Result<usize> {
    let general: GeneralConfig = config.get_as(GENERAL_NAMESPACE)?.unwrap_or_default();

    let counter = LogCounter::new();
    let logging_config =
        LoggingConfig::from_config(&paths.log_dir(), &general.log_level, general.log_max_files);
    // Keep the guard alive for the whole batch
    let log_guard = logging::init_logging(&logging_config, &counter)?;

    let interrupt = Interrupt::new();
    if let Err(e) = interrupt.install() {
        warn!("Failed to install interrupt handler: {}", e);
    }

    let ctx = Context::new(
        config,
        paths,
        Arc::new(RealExecutor::new()),
        counter,
        interrupt,
    );

    let mut manager = BackupManager::new(ctx)
        .with_notifier(NotificationManager::smtp(general))
        .with_log_file(log_guard.log_file().to_path_buf());

    let summary = manager.run(aliases);

    println!(
        "{} Backup finished: {} warning(s), {} error(s)",
        if summary.total.errors > 0 { "✗" } else { "✓" },
        summary.total.warnings,
        summary.total.errors
    );

    Ok(summary.total.errors)
}

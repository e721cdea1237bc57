//! Utilities for running commands with proper error handling and timeouts

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tracing::debug;

/// Run a command with optional timeout
///
/// A non-zero exit status is an error carrying the captured stderr and stdout.
pub fn run_command(
    program: &str,
    args: &[&str],
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    debug!("Running command: {} {}", program, args.join(" "));

    let output = match timeout {
        Some(limit) => output_with_timeout(cmd, program, limit)?,
        None => cmd
            .output()
            .context(format!("Failed to execute {}", program))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("Command failed: {}", program);
        anyhow::bail!(
            "Command failed with exit code {:?}: {} STDOUT: {}",
            output.status.code(),
            stderr.trim(),
            stdout.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout);
    }

    Ok(output)
}

fn output_with_timeout(cmd: Command, program: &str, limit: Duration) -> Result<Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime for command timeout")?;

    runtime.block_on(async {
        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);

        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(output) => output.context(format!("Failed to execute {}", program)),
            Err(_) => Err(anyhow::anyhow!(
                "{} timed out after {:?}",
                program,
                limit
            )),
        }
    })
}

/// Run a command line through the shell
///
/// Only the program name is logged, command lines may carry credentials.
pub fn run_shell_command(
    command: &str,
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Output> {
    debug!("Running shell command: {} ...", program_name(command));

    #[cfg(unix)]
    let (shell, flag) = ("sh", "-c");

    #[cfg(windows)]
    let (shell, flag) = ("cmd", "/C");

    let mut cmd = Command::new(shell);
    cmd.args([flag, command]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let program = program_name(command);
    let output = match timeout {
        Some(limit) => output_with_timeout(cmd, &program, limit)?,
        None => cmd
            .output()
            .context(format!("Failed to execute {}", program))?,
    };

    if !output.status.success() {
        anyhow::bail!(
            "{} failed with exit code {:?}: {} STDOUT: {}",
            program,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim(),
            String::from_utf8_lossy(&output.stdout).trim()
        );
    }

    Ok(output)
}

/// First word of a command line that is not an environment assignment
pub fn program_name(command: &str) -> String {
    shlex::split(command)
        .and_then(|words| words.into_iter().find(|word| !word.contains('=')))
        .unwrap_or_else(|| "shell command".to_string())
}

/// Quote `value` for interpolation into a shell command line
pub fn quote(value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .context("Value cannot be passed to the shell")
}

//! Command execution abstraction for testability
//!
//! Strategies never spawn processes directly; they go through a
//! [`CommandExecutor`] held by the run context so tests can substitute the
//! [`mock::MockExecutor`].

use anyhow::Result;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a program with arguments and optional timeout
    fn run_command(
        &self,
        program: &str,
        args: &[&str],
        working_dir: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Output>;

    /// Run a full command line through the shell
    fn run_shell_command(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Output>;

    /// Whether `program` can be found on `PATH`
    fn program_available(&self, program: &str) -> bool;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run_command(
        &self,
        program: &str,
        args: &[&str],
        working_dir: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_command(program, args, working_dir, timeout)
    }

    fn run_shell_command(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_shell_command(command, working_dir, timeout)
    }

    fn program_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        /// Program and arguments joined by spaces, or the shell command line
        pub command_line: String,
        pub working_dir: Option<String>,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String, stderr: String },
        Failure { stderr: String, exit_code: i32 },
        Timeout,
    }

    impl MockResponse {
        pub fn ok() -> Self {
            Self::default()
        }

        pub fn fail(exit_code: i32, stderr: &str) -> Self {
            MockResponse::Failure {
                stderr: stderr.to_string(),
                exit_code,
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }

    /// Mock executor for testing
    ///
    /// Responses are matched by substring against the command line, first
    /// configured match wins.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        responses: Arc<Mutex<Vec<(String, MockResponse)>>>,
        default_response: Arc<Mutex<MockResponse>>,
        missing_programs: Arc<Mutex<HashSet<String>>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for command lines containing `needle`
        pub fn expect(self, needle: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push((needle.to_string(), response));
            self
        }

        /// Set the default response for unconfigured commands
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Report `program` as not installed
        pub fn without_program(self, program: &str) -> Self {
            self.missing_programs
                .lock()
                .unwrap()
                .insert(program.to_string());
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Check if any command line containing `needle` was run
        pub fn was_called(&self, needle: &str) -> bool {
            self.call_count(needle) > 0
        }

        /// Number of command lines containing `needle`
        pub fn call_count(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.command_line.contains(needle))
                .count()
        }

        fn record_call(&self, command_line: &str, working_dir: Option<&Path>) {
            self.calls.lock().unwrap().push(CommandCall {
                command_line: command_line.to_string(),
                working_dir: working_dir.map(|p| p.display().to_string()),
            });
        }

        fn get_response(&self, command_line: &str) -> MockResponse {
            self.responses
                .lock()
                .unwrap()
                .iter()
                .find(|(needle, _)| command_line.contains(needle.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }

        fn execute(&self, command_line: &str, working_dir: Option<&Path>) -> Result<Output> {
            self.record_call(command_line, working_dir);

            match self.get_response(command_line) {
                MockResponse::Success { stdout, stderr } => Ok(Output {
                    status: std::process::ExitStatus::default(),
                    stdout: stdout.into_bytes(),
                    stderr: stderr.into_bytes(),
                }),
                MockResponse::Failure { stderr, exit_code } => {
                    anyhow::bail!("Command failed with exit code {:?}: {}", exit_code, stderr)
                }
                MockResponse::Timeout => {
                    anyhow::bail!("Command timed out")
                }
            }
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_command(
            &self,
            program: &str,
            args: &[&str],
            working_dir: Option<&Path>,
            _timeout: Option<Duration>,
        ) -> Result<Output> {
            let mut command_line = program.to_string();
            for arg in args {
                command_line.push(' ');
                command_line.push_str(arg);
            }
            self.execute(&command_line, working_dir)
        }

        fn run_shell_command(
            &self,
            command: &str,
            working_dir: Option<&Path>,
            _timeout: Option<Duration>,
        ) -> Result<Output> {
            self.execute(command, working_dir)
        }

        fn program_available(&self, program: &str) -> bool {
            !self.missing_programs.lock().unwrap().contains(program)
        }
    }
}

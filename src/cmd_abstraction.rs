//! Command execution abstraction for testability.
//!
//! Firewall backends and the DNS cache flush shell out to platform tools
//! (`nft`, `pfctl`, `netsh`, `resolvectl`, ...). Everything goes through
//! [`CommandExecutor`] so unit tests can assert on the exact invocations
//! without touching the host's firewall.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command exited with status 0
    pub success: bool,
    pub code: Option<i32>,
}

/// Trait for command execution, allowing dependency injection for testing.
///
/// Implementations block; async callers go through [`run`], which moves the
/// call onto tokio's blocking pool.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute `cmd` with `args`. An `Err` means the program could not be
    /// started at all (typically: not installed).
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;

    /// Execute `cmd` with `args`, writing `stdin` to its standard input.
    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin: &str) -> Result<CommandOutput>;
}

/// Runs real system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin_data: &str,
    ) -> Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(stdin_data.as_bytes())?;
        }

        let output = child.wait_with_output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait takes
/// `&[String]`.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Run a command on the blocking pool and return its raw output, whatever
/// the exit status.
pub async fn run_output(
    executor: &Arc<dyn CommandExecutor>,
    program: &str,
    args: &[&str],
    stdin: Option<String>,
) -> Result<CommandOutput> {
    let executor = Arc::clone(executor);
    let program_owned = program.to_string();
    let args = args_to_strings(args);

    tokio::task::spawn_blocking(move || match stdin {
        Some(input) => executor.execute_with_stdin(&program_owned, &args, &input),
        None => executor.execute(&program_owned, &args),
    })
    .await
    .with_context(|| format!("{} task panicked", program))?
}

/// Run a command on the blocking pool and require a zero exit status.
///
/// Returns stdout on success; a non-zero exit becomes an error carrying
/// stderr.
pub async fn run(
    executor: &Arc<dyn CommandExecutor>,
    program: &str,
    args: &[&str],
    stdin: Option<String>,
) -> Result<String> {
    let output = run_output(executor, program, args, stdin).await?;

    if output.success {
        Ok(output.stdout)
    } else {
        anyhow::bail!("{} failed: {}", program, output.stderr.trim())
    }
}

#[cfg(test)]
pub(crate) fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        success: true,
        code: Some(0),
    }
}

#[cfg(test)]
pub(crate) fn failed_output(stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        success: false,
        code: Some(1),
    }
}
